//! HTTP surface of the agent
//!
//! Exposes device provisioning (`/agent/devices`) and the NGSI notification
//! endpoint (`/{v1,ngsi10}/notifyContext/{device_id}`). Path prefixes are
//! accepted in both the lowercase and uppercase spellings brokers have been
//! observed to use.
//!
//! The notification endpoint always answers HTTP 200; the NGSI outcome is
//! carried in the embedded `responseCode`, including parse failures.

use crate::agent::Agent;
use crate::notify::NotificationRouter;
use crate::protocol::ngsi::{NotifyContext, NotifyContextResponse};
use crate::registry::Device;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{Filter, Reply};

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub struct ApiServer {
    agent: Arc<Agent>,
    router: Arc<NotificationRouter>,
    port: u16,
}

impl ApiServer {
    pub fn new(agent: Arc<Agent>, router: Arc<NotificationRouter>, port: u16) -> Self {
        Self {
            agent,
            router,
            port,
        }
    }

    /// Build the full route tree
    pub fn routes(&self) -> BoxedFilter<(warp::reply::Response,)> {
        register_route("agent", self.agent.clone())
            .or(register_route("AGENT", self.agent.clone()))
            .unify()
            .or(unregister_route("agent", self.agent.clone()))
            .unify()
            .or(unregister_route("AGENT", self.agent.clone()))
            .unify()
            .or(notify_route("v1", self.router.clone()))
            .unify()
            .or(notify_route("ngsi10", self.router.clone()))
            .unify()
            .or(notify_route("NGSI10", self.router.clone()))
            .unify()
            .boxed()
    }

    /// Serve until the process exits
    pub async fn run(self) {
        info!(port = self.port, "Starting the HTTP server");
        let routes = self.routes();
        warp::serve(routes).run(([0, 0, 0, 0], self.port)).await;
    }
}

/// POST /{prefix}/devices
fn register_route(
    prefix: &'static str,
    agent: Arc<Agent>,
) -> BoxedFilter<(warp::reply::Response,)> {
    warp::path(prefix)
        .and(warp::path("devices"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and_then(move |device: Device| {
            let agent = agent.clone();
            async move {
                match agent.register(&device).await {
                    Ok(()) => {
                        let device_id = device.id().map(str::to_string).unwrap_or_default();
                        let reply = warp::reply::with_header(
                            warp::reply::with_status(warp::reply(), StatusCode::CREATED),
                            "Location",
                            format!("/devices/{device_id}"),
                        );
                        Ok::<_, Infallible>(reply.into_response())
                    }
                    Err(e) => {
                        error!(error = %e, "Device registration failed");
                        let body = ErrorBody {
                            error: e.to_string(),
                        };
                        Ok::<_, Infallible>(
                            warp::reply::with_status(
                                warp::reply::json(&body),
                                StatusCode::INTERNAL_SERVER_ERROR,
                            )
                            .into_response(),
                        )
                    }
                }
            }
        })
        .boxed()
}

/// DELETE /{prefix}/devices/{device_id}
fn unregister_route(
    prefix: &'static str,
    agent: Arc<Agent>,
) -> BoxedFilter<(warp::reply::Response,)> {
    warp::path(prefix)
        .and(warp::path("devices"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::delete())
        .and_then(move |device_id: String| {
            let agent = agent.clone();
            async move {
                match agent.unregister(&device_id).await {
                    Ok(()) => Ok::<_, Infallible>(
                        warp::reply::with_status(warp::reply(), StatusCode::NO_CONTENT)
                            .into_response(),
                    ),
                    Err(e) => {
                        error!(device_id, error = %e, "Device unregistration failed");
                        let body = ErrorBody {
                            error: e.to_string(),
                        };
                        Ok::<_, Infallible>(
                            warp::reply::with_status(
                                warp::reply::json(&body),
                                StatusCode::INTERNAL_SERVER_ERROR,
                            )
                            .into_response(),
                        )
                    }
                }
            }
        })
        .boxed()
}

/// POST /{prefix}/notifyContext/{device_id}
///
/// The body is read raw so malformed JSON can still be answered with the
/// mandated HTTP 200 carrying an embedded 400.
fn notify_route(
    prefix: &'static str,
    router: Arc<NotificationRouter>,
) -> BoxedFilter<(warp::reply::Response,)> {
    warp::path(prefix)
        .and(warp::path("notifyContext"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::bytes())
        .and_then(move |device_id: String, body: Bytes| {
            let router = router.clone();
            async move {
                let response = match serde_json::from_slice::<NotifyContext>(&body) {
                    Ok(notification) => router.handle(&device_id, notification).await,
                    Err(e) => {
                        warn!(device_id, error = %e, "Unparseable notification body");
                        NotifyContextResponse::bad_request()
                    }
                };
                Ok::<_, Infallible>(warp::reply::json(&response).into_response())
            }
        })
        .boxed()
}
