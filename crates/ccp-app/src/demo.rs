//! A small food-ordering application.
//!
//! home -> delivery list -> item details (taste/quantity form) -> cart ->
//! checkout -> order placed. Reaching the success page completes the task.

use std::collections::HashMap;

use ccp_protocol::{
    Action, ApplicationRecord, CapabilitySnapshot, Command, Element, FormField, FormRequest,
};
use serde_json::{json, Map, Value};

use crate::application::{ActionOutcome, ControlledApplication, FormOutcome};

pub const DEMO_SHOP_ID: &str = "demo_shop_v1";

const TASTES: [&str; 3] = ["Original", "Mild", "Spicy"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Home,
    Delivery,
    FoodDetails,
    Cart,
    Checkout,
    OrderSuccess,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "homepage",
            Self::Delivery => "delivery_page",
            Self::FoodDetails => "food_details_page",
            Self::Cart => "cart_page",
            Self::Checkout => "checkout_page",
            Self::OrderSuccess => "order_success_page",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    pub id: String,
    pub name: String,
    pub taste: String,
    pub quantity: u32,
}

/// The dish open on the details page, plus whatever the form filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingItem {
    id: String,
    name: String,
    taste: Option<String>,
    quantity: Option<u32>,
}

impl PendingItem {
    fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            taste: None,
            quantity: None,
        }
    }

    fn context(&self) -> Value {
        json!({"id": self.id, "name": self.name})
    }
}

pub struct DemoShop {
    software_id: String,
    view: View,
    cart: Vec<CartItem>,
    pending: Option<PendingItem>,
    inputs: HashMap<String, String>,
    orders_placed: usize,
}

impl Default for DemoShop {
    fn default() -> Self {
        Self::new(DEMO_SHOP_ID)
    }
}

impl DemoShop {
    pub fn new(software_id: impl Into<String>) -> Self {
        Self {
            software_id: software_id.into(),
            view: View::Home,
            cart: Vec::new(),
            pending: None,
            inputs: HashMap::new(),
            orders_placed: 0,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn cart(&self) -> &[CartItem] {
        &self.cart
    }

    pub fn orders_placed(&self) -> usize {
        self.orders_placed
    }

    fn input(&self, id: &str) -> String {
        self.inputs.get(id).cloned().unwrap_or_default()
    }

    fn text_input(&self, id: &str, label: &str, description: &str) -> Element {
        let mut element = Element::new(id, "text_input", label, description);
        element.current_value = Some(Value::String(self.input(id)));
        element
    }

    fn elements(&self) -> Vec<Element> {
        match self.view {
            View::Home => vec![
                Element::new("hp_delivery_button", "button", "Delivery", "Open the food delivery channel"),
                Element::new("hp_hotel_button", "button", "Hotels", "Open hotel booking"),
                Element::new("hp_movie_button", "button", "Movies", "Browse movie tickets"),
            ],
            View::Delivery => vec![
                self.text_input("dl_search_food_input", "Search food", "Type a dish name to search for"),
                Element::new("dl_search_food_button", "button", "Search", "Run the food search"),
                Element::new("dl_food_list_item_1", "list_item", "Peking Duck", "Select Peking Duck"),
                Element::new("dl_food_list_item_2", "list_item", "Kung Pao Chicken", "Select Kung Pao Chicken"),
                Element::new(
                    "dl_view_cart_button",
                    "button",
                    format!("View cart ({} items)", self.cart.len()),
                    "Show the items currently in the cart",
                ),
                Element::new("dl_back_to_home_button", "button", "Home", "Return to the home page"),
            ],
            View::FoodDetails => {
                let name = self.pending.as_ref().map_or("item", |p| p.name.as_str());
                vec![
                    Element::new(
                        "fd_select_taste_button",
                        "button",
                        format!("Choose options for {name}"),
                        "Pick taste and quantity",
                    ),
                    Element::new(
                        "fd_add_to_cart_button",
                        "button",
                        "Add to cart",
                        "Add the item to the cart (choose options first)",
                    ),
                    Element::new("fd_back_to_delivery_button", "button", "Back", "Return to the delivery list"),
                ]
            }
            View::Cart => {
                let summary = if self.cart.is_empty() {
                    "Cart is empty".to_string()
                } else {
                    self.cart
                        .iter()
                        .map(|i| format!("{}({})x{}", i.name, i.taste, i.quantity))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let mut elements = vec![
                    Element::new("cp_item_summary", "label", format!("Cart: {summary}"), "Items in the cart"),
                    Element::new("cp_continue_shopping_button", "button", "Keep shopping", "Return to the delivery list"),
                ];
                if !self.cart.is_empty() {
                    elements.push(Element::new(
                        "cp_proceed_to_checkout_button",
                        "button",
                        "Checkout",
                        "Go to order confirmation",
                    ));
                }
                elements
            }
            View::Checkout => vec![
                self.text_input("co_address_field", "Delivery address", "Where to deliver the order"),
                self.text_input("co_phone_field", "Phone", "Contact phone number"),
                Element::new("co_confirm_order_button", "button", "Place order", "Submit the order"),
                Element::new("co_back_to_cart_button", "button", "Back to cart", "Edit the cart"),
            ],
            View::OrderSuccess => vec![
                Element::new("os_message_label", "label", "Order placed!", "Order confirmation"),
                Element::new("os_back_to_home_button", "button", "Home", "Return to the home page"),
            ],
        }
    }

    fn taste_form(&self, item: &PendingItem) -> FormRequest {
        FormRequest {
            software_id: self.software_id.clone(),
            form_description: format!("Choose taste and quantity for {}", item.name),
            item_context: Some(item.context()),
            fields: vec![
                FormField {
                    id: "taste".into(),
                    label: "Taste".into(),
                    kind: "select".into(),
                    options: Some(TASTES.iter().map(|t| t.to_string()).collect()),
                    default: Some(json!(TASTES[0])),
                },
                FormField {
                    id: "quantity".into(),
                    label: "Quantity".into(),
                    kind: "number".into(),
                    options: None,
                    default: Some(json!(1)),
                },
            ],
        }
    }

    fn click(&mut self, id: &str) -> ActionOutcome {
        match id {
            "hp_delivery_button" | "cp_continue_shopping_button" | "fd_back_to_delivery_button" => {
                self.view = View::Delivery;
            }
            "hp_hotel_button" | "hp_movie_button" => {
                return ActionOutcome::Done(format!("Clicked '{id}' (not available in this shop)"));
            }
            "dl_search_food_button" => {
                let term = self.input("dl_search_food_input");
                return ActionOutcome::Done(format!("Searched for '{term}'"));
            }
            "dl_food_list_item_1" => self.open_item(id, "Peking Duck"),
            "dl_food_list_item_2" => self.open_item(id, "Kung Pao Chicken"),
            "fd_select_taste_button" => {
                let Some(item) = &self.pending else {
                    return ActionOutcome::Failed("no item selected".into());
                };
                return ActionOutcome::NeedsForm(self.taste_form(item));
            }
            "fd_add_to_cart_button" => return self.add_to_cart(),
            "dl_view_cart_button" | "co_back_to_cart_button" => self.view = View::Cart,
            "cp_proceed_to_checkout_button" => self.view = View::Checkout,
            "co_confirm_order_button" => return self.place_order(),
            "dl_back_to_home_button" | "os_back_to_home_button" => self.view = View::Home,
            _ => {
                return ActionOutcome::Failed(format!("'{id}' is not clickable"));
            }
        }
        ActionOutcome::Done(format!("Clicked '{id}'"))
    }

    fn open_item(&mut self, id: &str, name: &str) {
        self.pending = Some(PendingItem::new(id, name));
        self.view = View::FoodDetails;
    }

    fn add_to_cart(&mut self) -> ActionOutcome {
        let Some(item) = self.pending.take() else {
            return ActionOutcome::Failed("no item selected".into());
        };
        let (Some(taste), Some(quantity)) = (item.taste.clone(), item.quantity) else {
            let name = item.name.clone();
            self.pending = Some(item);
            return ActionOutcome::Failed(format!("choose taste and quantity for {name} first"));
        };
        self.cart.push(CartItem {
            id: item.id,
            name: item.name.clone(),
            taste,
            quantity,
        });
        self.view = View::Cart;
        ActionOutcome::Done(format!("Added {} to cart ({} items)", item.name, self.cart.len()))
    }

    fn place_order(&mut self) -> ActionOutcome {
        if self.cart.is_empty() {
            return ActionOutcome::Failed("cart is empty".into());
        }
        let address = self.input("co_address_field");
        let phone = self.input("co_phone_field");
        if address.trim().is_empty() || phone.trim().is_empty() {
            return ActionOutcome::Failed("address or phone is missing".into());
        }

        let items = self.cart.len();
        tracing::info!(items, address = %address, "Order placed");
        self.cart.clear();
        self.inputs.remove("co_address_field");
        self.inputs.remove("co_phone_field");
        self.orders_placed += 1;
        self.view = View::OrderSuccess;
        ActionOutcome::Done(format!("Order of {items} item(s) placed for delivery to '{address}'"))
    }
}

/// Accepts `3`, `"3"` and `" 3 "`.
fn parse_quantity(value: Option<&Value>) -> Option<u32> {
    let n = match value? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u32::try_from(n).ok().filter(|n| *n > 0)
}

impl ControlledApplication for DemoShop {
    fn identity(&self) -> ApplicationRecord {
        ApplicationRecord::new(
            self.software_id.clone(),
            "Demo Shop",
            "Food delivery, hotels and movie tickets in one app, controllable by an agent.",
            vec![
                "food".into(),
                "delivery".into(),
                "order".into(),
                "takeout".into(),
                "hotel".into(),
            ],
        )
    }

    fn capabilities(&self) -> CapabilitySnapshot {
        let mut snapshot = CapabilitySnapshot::new(self.view.as_str(), self.elements());
        if self.view == View::FoodDetails {
            snapshot.item_context = self.pending.as_ref().map(PendingItem::context);
        }
        snapshot
    }

    fn perform(&mut self, action: &Action) -> ActionOutcome {
        let Some(id) = action.element_id.as_deref().filter(|id| !id.is_empty()) else {
            return ActionOutcome::Failed(format!("{} without an element id", action.command));
        };
        if !self.elements().iter().any(|e| e.id == id) {
            return ActionOutcome::Failed(format!("'{id}' is not on {}", self.view.as_str()));
        }
        match action.command {
            Command::Click => self.click(id),
            Command::TypeText => {
                let text = action.text.clone().unwrap_or_default();
                let done = format!("Typed '{text}' into '{id}'");
                self.inputs.insert(id.to_string(), text);
                ActionOutcome::Done(done)
            }
        }
    }

    fn submit_form(&mut self, form_data: &Map<String, Value>) -> FormOutcome {
        let Some(item) = self.pending.as_mut() else {
            return FormOutcome::Rejected("no item is waiting for options".into());
        };
        let taste = form_data
            .get("taste")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let quantity = parse_quantity(form_data.get("quantity"));
        match (taste, quantity) {
            (Some(taste), Some(quantity)) => {
                item.taste = Some(taste.to_string());
                item.quantity = Some(quantity);
                FormOutcome::Accepted(format!("{} x{} ({})", item.name, quantity, taste))
            }
            _ => FormOutcome::Rejected(format!("taste and quantity are required for {}", item.name)),
        }
    }

    fn receive_form(&mut self, form: &FormRequest) {
        let id = form
            .item_context
            .as_ref()
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str);
        if let (Some(id), Some(name)) = (id, form.item_name()) {
            tracing::info!(item = %name, "Item context set by controller form");
            self.pending = Some(PendingItem::new(id, name));
        }
    }

    fn task_complete(&self) -> bool {
        self.view == View::OrderSuccess
    }
}
