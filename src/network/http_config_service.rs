use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use autometrics::autometrics;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::warn;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::ConfigQuery;
use crate::ConfigQueryOutcome;
use crate::ConfigRequest;
use crate::Error;
use crate::NetworkError;
use crate::NotificationBroker;
use crate::NotificationMessages;
use crate::PollOutcome;
use crate::PollRequest;
use crate::Result;
use crate::ServiceInstance;
use crate::API_SLO;

/// Everything the HTTP handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct HttpState {
    pub broker: Arc<NotificationBroker>,
    pub configs: Arc<ConfigQuery>,
    pub instances: Arc<Vec<ServiceInstance>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationsParams {
    app_id: String,
    cluster: String,
    notifications: String,
    data_center: Option<String>,
    ip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigParams {
    release_key: Option<String>,
    data_center: Option<String>,
    ip: Option<String>,
    messages: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServicesParams {
    app_id: Option<String>,
    ip: Option<String>,
}

/// All relay routes.
pub fn routes(state: HttpState) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let with_state = {
        let state = state.clone();
        warp::any().map(move || state.clone())
    };

    let notifications = warp::path!("notifications" / "v2")
        .or(warp::path!("notifications"))
        .unify()
        .and(warp::get())
        .and(warp::query::<NotificationsParams>())
        .and(with_state.clone())
        .and_then(poll_notifications);

    let configs = warp::path!("configs" / String / String / String)
        .and(warp::get())
        .and(warp::query::<ConfigParams>())
        .and(with_state.clone())
        .and_then(query_config);

    let services = warp::path!("services" / "config")
        .and(warp::get())
        .and(warp::query::<ServicesParams>())
        .and(with_state)
        .and_then(config_services);

    notifications.or(configs).unify().or(services).unify()
}

#[cfg_attr(not(doc), autometrics(objective = API_SLO))]
async fn poll_notifications(
    params: NotificationsParams,
    state: HttpState,
) -> std::result::Result<Response, Infallible> {
    let notifications = match NotificationBroker::parse_notifications(&params.notifications) {
        Ok(n) => n,
        Err(e) => {
            debug!(app_id = %params.app_id, ?e, "rejecting long poll");
            return Ok(error_reply(&e));
        }
    };

    let request = PollRequest {
        app_id: params.app_id,
        cluster: params.cluster,
        notifications,
        data_center: params.data_center,
        client_ip: params.ip,
    };

    Ok(match state.broker.poll(request).await {
        Ok(PollOutcome::Changed(notifications)) => warp::reply::json(&notifications).into_response(),
        Ok(PollOutcome::NotModified) => StatusCode::NOT_MODIFIED.into_response(),
        Err(e) => error_reply(&e),
    })
}

#[cfg_attr(not(doc), autometrics(objective = API_SLO))]
async fn query_config(
    app_id: String,
    cluster: String,
    namespace: String,
    params: ConfigParams,
    state: HttpState,
) -> std::result::Result<Response, Infallible> {
    let messages = params.messages.as_deref().and_then(|raw| {
        serde_json::from_str::<NotificationMessages>(raw)
            .map_err(|e| warn!(%raw, ?e, "ignoring malformed messages"))
            .ok()
    });

    let request = ConfigRequest {
        app_id: decode_segment(&app_id),
        cluster: decode_segment(&cluster),
        namespace: decode_segment(&namespace),
        data_center: params.data_center,
        client_ip: params.ip,
        release_key: params.release_key,
        messages,
    };

    Ok(match state.configs.query(&request) {
        Ok(ConfigQueryOutcome::Found(config)) => warp::reply::json(&config).into_response(),
        Ok(ConfigQueryOutcome::NotModified) => StatusCode::NOT_MODIFIED.into_response(),
        Ok(ConfigQueryOutcome::NotFound) => warp::reply::with_status(
            format!(
                "Could not load configurations with appId: {}, clusterName: {}, namespace: {}",
                request.app_id, request.cluster, request.namespace
            ),
            StatusCode::NOT_FOUND,
        )
        .into_response(),
        Err(e) => error_reply(&e),
    })
}

async fn config_services(
    params: ServicesParams,
    state: HttpState,
) -> std::result::Result<Response, Infallible> {
    debug!(app_id = ?params.app_id, ip = ?params.ip, "config services requested");
    Ok(warp::reply::json(state.instances.as_ref()).into_response())
}

/// warp hands path parameters over still percent-encoded.
fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn error_reply(e: &Error) -> Response {
    let status = match e {
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => {
            error!(?e, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    warp::reply::with_status(e.to_string(), status).into_response()
}

/// Binds the relay routes on `address`. The returned future serves until
/// `shutdown` fires.
pub fn bind(
    address: SocketAddr,
    state: HttpState,
    mut shutdown: watch::Receiver<()>,
) -> Result<(SocketAddr, impl Future<Output = ()>)> {
    warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(address, async move {
            let _ = shutdown.changed().await;
        })
        .map_err(|e| {
            Error::from(NetworkError::Bind {
                address: address.to_string(),
                reason: e.to_string(),
            })
        })
}
