use super::*;

pub const ROOT_PATH: &str = "/";
pub const FAVICON_PATH: &str = "/favicon.ico";
pub const COMMANDS_PATH: &str = "/commands";
pub const GAME_VARIABLES_PATH: &str = "/game-variables";
pub const HEARTBEAT_PATH: &str = "/heartbeat";

/// Where a request goes.
pub enum Route {
    Operation(Arc<OperationDescriptor>),
    Index,
    Favicon,
    Commands,
    GameVariables,
    Heartbeat,
    NotFound,
}

fn fixed_route(path: &str) -> Option<Route> {
    match path {
        ROOT_PATH => Some(Route::Index),
        FAVICON_PATH => Some(Route::Favicon),
        COMMANDS_PATH => Some(Route::Commands),
        GAME_VARIABLES_PATH => Some(Route::GameVariables),
        HEARTBEAT_PATH => Some(Route::Heartbeat),
        _ => None,
    }
}

/// Resolves a request without touching any state but the registry.
///
/// Operations are only reachable with GET and take priority over the
/// built-in paths. Built-in paths answer any method. A registry that is not
/// published yet behaves as an empty one.
pub fn route(method: &Method, path: &str, registry: Option<&OperationRegistry>) -> Route {
    if *method == Method::GET {
        if let Some(op) = registry.and_then(|r| r.resolve(path)) {
            return Route::Operation(op.clone());
        }
    }
    fixed_route(path).unwrap_or(Route::NotFound)
}

pub fn build_router(state: EdgeState) -> Router {
    Router::new().fallback(routes::dispatch).with_state(state)
}
