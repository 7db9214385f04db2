//! CCP App - the application side of the protocol
//!
//! A controlled application describes its current view as a capability
//! snapshot and accepts `CLICK` / `TYPE_TEXT` actions. [`AppRuntime`]
//! connects it to the relay; [`DemoShop`] is a small food-ordering
//! application implementing the contract.

pub mod application;
pub mod config;
pub mod demo;
pub mod error;
pub mod runtime;

pub use application::{ActionOutcome, ControlledApplication, ExecutionOutcome, FormOutcome};
pub use config::AppConfig;
pub use demo::{CartItem, DemoShop, View, DEMO_SHOP_ID};
pub use error::AppError;
pub use runtime::{run, AppRuntime};
