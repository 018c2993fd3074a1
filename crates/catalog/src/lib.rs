//! `miam-catalog`: restaurants and their menus.

pub mod restaurant;

pub use restaurant::{
    AddMenuItem, CloseRestaurant, CreateRestaurant, DEFAULT_PREP_MINUTES, MenuItem,
    MenuItemChanged, MenuItemRemoved, OpenRestaurant, OpeningChanged, RESTAURANT_AGGREGATE,
    RemoveMenuItem, Restaurant, RestaurantCommand, RestaurantDetails, RestaurantEvent,
    SetMenuItemAvailability, UpdateMenuItem, UpdateRestaurant,
};
