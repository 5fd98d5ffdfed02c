use super::*;

pub(super) async fn dispatch(
    State(state): State<EdgeState>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
) -> HttpReply {
    let registry = state.registry.get();
    let path = uri.path();
    // Request lines stay out of the heartbeat buffer.
    debug!("[Tickwire] {method} {path}");

    match route(&method, path, registry.as_deref()) {
        Route::Operation(op) => run_operation(&state, op, &query).await,
        Route::Index => state.assets.index(&state.log).await,
        Route::Favicon => state.assets.favicon(&state.log).await,
        Route::Commands => {
            let listing =
                CommandsListing::from_registry(&state.product_name, registry.as_deref(), &state.log);
            HttpReply::json(StatusCode::OK, &listing)
        }
        Route::GameVariables => HttpReply::json(
            StatusCode::OK,
            &types::variable_values(registry.as_deref(), &state.log),
        ),
        Route::Heartbeat => {
            let game_variables = types::variable_values(registry.as_deref(), &state.log);
            let heartbeat = Heartbeat {
                game_variables,
                log_results: state.log.buffer().drain(),
            };
            HttpReply::json(StatusCode::OK, &heartbeat)
        }
        Route::NotFound => HttpReply::not_found(),
    }
}

/// Coerces arguments, queues the call for the main tick and waits for the
/// operation to finalize its response.
async fn run_operation(
    state: &EdgeState,
    operation: Arc<OperationDescriptor>,
    query: &HashMap<String, String>,
) -> HttpReply {
    let args = match coerce_args(&operation.params, query) {
        Ok(args) => args,
        Err(e) => {
            state.log.log_message(
                format!("Rejected {}: {e}", operation.path),
                LogLevel::Raised,
            );
            return HttpReply::error(StatusCode::INTERNAL_SERVER_ERROR, format!("Server error. {e}"));
        }
    };

    let (response, reply) = ResponseHandle::new(operation.path.clone(), state.log.clone());
    let path = operation.path.clone();
    if let Err(mut rejected) = state.queue.enqueue(PendingInvocation {
        operation,
        args,
        response,
    }) {
        rejected.response.send(HttpReply::error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Main tick is not running.",
        ));
    }

    match tokio::time::timeout(state.invocation_timeout, reply).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(_)) => HttpReply::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Response was closed without a reply.",
        ),
        Err(_) => {
            state.log.log_message(
                format!("{path} did not run within {:?}", state.invocation_timeout),
                LogLevel::Raised,
            );
            HttpReply::error(
                StatusCode::GATEWAY_TIMEOUT,
                "Timed out waiting for the main tick.",
            )
        }
    }
}
