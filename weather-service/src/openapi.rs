use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use common::models::{CacheTier, Coordinates, HealthResponse, WeatherRecord};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::get_weather,
    ),
    components(schemas(
        WeatherRecord,
        Coordinates,
        CacheTier,
        HealthResponse,
    )),
    tags(
        (name = "weather", description = "Cached current-weather lookups"),
        (name = "health", description = "Liveness"),
    ),
)]
struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
