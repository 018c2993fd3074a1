use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use chrono::Utc;

use miam_auth::Role;
use miam_auth::permissions::catalog;
use miam_catalog::{
    AddMenuItem, CloseRestaurant, CreateRestaurant, MenuItem, OpenRestaurant, RemoveMenuItem,
    RestaurantCommand, SetMenuItemAvailability, UpdateMenuItem, UpdateRestaurant,
};
use miam_core::{MenuItemId, RestaurantId};
use miam_infra::projections::{RestaurantFilter, RestaurantView};

use crate::app::dto::{self, AppJson, AppQuery};
use crate::app::errors::{ApiError, ApiResult};
use crate::app::routes::common::{CmdAuth, parse_id};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_restaurants).post(create_restaurant))
        .route("/mine", get(my_restaurants))
        .route("/:id", get(get_restaurant).patch(update_restaurant))
        .route("/:id/open", post(open_restaurant))
        .route("/:id/close", post(close_restaurant))
        .route("/:id/menu", get(get_menu).post(add_menu_item))
        .route("/:id/menu/:item_id", patch(update_menu_item).delete(remove_menu_item))
        .route("/:id/menu/:item_id/availability", put(set_item_availability))
}

fn view(services: &AppServices, id: RestaurantId) -> ApiResult<RestaurantView> {
    services.read().restaurants.get(id).ok_or_else(|| ApiError::not_found("restaurant"))
}

/// Run a catalog command that needs `permission`, then return the fresh view.
async fn mutate(
    services: &AppServices,
    principal: &PrincipalContext,
    restaurant_id: RestaurantId,
    permission: miam_auth::Permission,
    cmd: RestaurantCommand,
) -> ApiResult<Json<RestaurantView>> {
    let cmd = CmdAuth::new(cmd, [permission]).authorize(principal)?;
    services.restaurant(restaurant_id, cmd).await?;
    view(services, restaurant_id).map(Json)
}

pub async fn list_restaurants(
    Extension(services): Extension<Arc<AppServices>>,
    AppQuery(query): AppQuery<dto::RestaurantQuery>,
) -> Json<Vec<RestaurantView>> {
    let filter = RestaurantFilter { cuisine: query.cuisine, open: query.open, owner_id: None };
    Json(services.read().restaurants.list(&filter))
}

pub async fn my_restaurants(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
) -> Json<Vec<RestaurantView>> {
    let filter =
        RestaurantFilter { owner_id: Some(principal.user_id()), ..RestaurantFilter::default() };
    Json(services.read().restaurants.list(&filter))
}

pub async fn get_restaurant(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<RestaurantView>> {
    view(&services, parse_id(&id)?).map(Json)
}

pub async fn get_menu(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MenuItem>>> {
    Ok(Json(view(&services, parse_id(&id)?)?.menu))
}

pub async fn create_restaurant(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    AppJson(body): AppJson<dto::CreateRestaurantRequest>,
) -> ApiResult<impl IntoResponse> {
    if principal.role() != Role::Restaurateur {
        return Err(ApiError::forbidden("only restaurateurs can create restaurants"));
    }
    let restaurant_id = RestaurantId::new();
    let cmd = RestaurantCommand::Create(CreateRestaurant {
        restaurant_id,
        owner_id: principal.user_id(),
        name: body.name,
        description: body.description,
        cuisine: body.cuisine,
        address: body.address,
        phone: body.phone,
        prep_minutes: body.prep_minutes,
        occurred_at: Utc::now(),
    });
    let created =
        mutate(&services, &principal, restaurant_id, catalog::RESTAURANT_MANAGE, cmd).await?;
    Ok((StatusCode::CREATED, created))
}

pub async fn update_restaurant(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    AppJson(body): AppJson<dto::UpdateRestaurantRequest>,
) -> ApiResult<Json<RestaurantView>> {
    let restaurant_id = parse_id(&id)?;
    let cmd = RestaurantCommand::Update(UpdateRestaurant {
        restaurant_id,
        actor: principal.actor(),
        name: body.name,
        description: body.description,
        cuisine: body.cuisine,
        address: body.address,
        phone: body.phone,
        prep_minutes: body.prep_minutes,
        occurred_at: Utc::now(),
    });
    mutate(&services, &principal, restaurant_id, catalog::RESTAURANT_MANAGE, cmd).await
}

pub async fn open_restaurant(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<RestaurantView>> {
    let restaurant_id = parse_id(&id)?;
    let cmd = RestaurantCommand::Open(OpenRestaurant {
        restaurant_id,
        actor: principal.actor(),
        occurred_at: Utc::now(),
    });
    mutate(&services, &principal, restaurant_id, catalog::RESTAURANT_MANAGE, cmd).await
}

pub async fn close_restaurant(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> ApiResult<Json<RestaurantView>> {
    let restaurant_id = parse_id(&id)?;
    let cmd = RestaurantCommand::Close(CloseRestaurant {
        restaurant_id,
        actor: principal.actor(),
        occurred_at: Utc::now(),
    });
    mutate(&services, &principal, restaurant_id, catalog::RESTAURANT_MANAGE, cmd).await
}

pub async fn add_menu_item(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    AppJson(body): AppJson<dto::AddMenuItemRequest>,
) -> ApiResult<impl IntoResponse> {
    let restaurant_id = parse_id(&id)?;
    let item_id = MenuItemId::new();
    let cmd = RestaurantCommand::AddMenuItem(AddMenuItem {
        restaurant_id,
        actor: principal.actor(),
        item_id,
        name: body.name,
        description: body.description,
        price: body.price,
        category: body.category,
        occurred_at: Utc::now(),
    });
    let Json(restaurant) =
        mutate(&services, &principal, restaurant_id, catalog::MENU_MANAGE, cmd).await?;
    let item = restaurant
        .menu
        .into_iter()
        .find(|i| i.id == item_id)
        .ok_or_else(|| ApiError::not_found("menu item"))?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_menu_item(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, item_id)): Path<(String, String)>,
    AppJson(body): AppJson<dto::UpdateMenuItemRequest>,
) -> ApiResult<Json<RestaurantView>> {
    let restaurant_id = parse_id(&id)?;
    let cmd = RestaurantCommand::UpdateMenuItem(UpdateMenuItem {
        restaurant_id,
        actor: principal.actor(),
        item_id: parse_id(&item_id)?,
        name: body.name,
        description: body.description,
        price: body.price,
        category: body.category,
        occurred_at: Utc::now(),
    });
    mutate(&services, &principal, restaurant_id, catalog::MENU_MANAGE, cmd).await
}

pub async fn set_item_availability(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, item_id)): Path<(String, String)>,
    AppJson(body): AppJson<dto::AvailabilityRequest>,
) -> ApiResult<Json<RestaurantView>> {
    let restaurant_id = parse_id(&id)?;
    let cmd = RestaurantCommand::SetMenuItemAvailability(SetMenuItemAvailability {
        restaurant_id,
        actor: principal.actor(),
        item_id: parse_id(&item_id)?,
        available: body.available,
        occurred_at: Utc::now(),
    });
    mutate(&services, &principal, restaurant_id, catalog::MENU_MANAGE, cmd).await
}

pub async fn remove_menu_item(
    principal: PrincipalContext,
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, item_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let restaurant_id = parse_id(&id)?;
    let cmd = RestaurantCommand::RemoveMenuItem(RemoveMenuItem {
        restaurant_id,
        actor: principal.actor(),
        item_id: parse_id(&item_id)?,
        occurred_at: Utc::now(),
    });
    mutate(&services, &principal, restaurant_id, catalog::MENU_MANAGE, cmd).await?;
    Ok(StatusCode::NO_CONTENT)
}
