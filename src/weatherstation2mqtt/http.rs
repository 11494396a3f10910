// weatherstation2mqtt - Bridge Weather Underground style station uploads to MQTT
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::config::{ConfigForm, ConfigModel, Configuration};
use crate::dashboard;
use crate::discovery;
use crate::metrics::{BridgeMetrics, TARGET_DISCOVERY, TARGET_STATE};
use crate::mqtt::{Message, MqttPublisher};
use crate::observation::{normalize, raw_params};
use crate::state::{Snapshot, StateStore};
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};
use tower_http::trace::TraceLayer;

/// Path stations upload observations to.
pub const UPLOAD_PATH: &str = "/weatherstation/updateweatherstation.php";

const OPENMETRICS_FORMAT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Request to stop serving so that a supervisor can restart the process.
#[derive(Debug, Default)]
pub struct RestartSignal {
    requested: AtomicBool,
    notify: Notify,
}

impl RestartSignal {
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Return after `request()` has been called.
    pub async fn wait(&self) {
        if !self.requested() {
            self.notify.notified().await;
        }
    }
}

/// Messages to publish in a single broker connection.
struct PublishJob {
    cfg: Configuration,
    messages: Vec<Message>,
    target: &'static str,
    done: oneshot::Sender<()>,
}

/// Everything request handlers need, shared between all requests.
#[derive(Debug)]
pub struct RequestContext {
    pub state: StateStore,
    pub config: ConfigModel,
    pub metrics: BridgeMetrics,
    pub restart: RestartSignal,
    publishes: mpsc::UnboundedSender<PublishJob>,
    registry: Registry,
    discovery_prefix: String,
}

impl RequestContext {
    /// Create a new context and start the task that publishes to the broker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<S: Into<String>>(config: ConfigModel, publisher: MqttPublisher, discovery_prefix: S) -> Self {
        let mut registry = BridgeMetrics::registry();
        let metrics = BridgeMetrics::new(&mut registry);
        let (publishes, jobs) = mpsc::unbounded_channel();
        tokio::spawn(publish_worker(publisher, metrics.clone(), jobs));

        RequestContext {
            state: StateStore::new(),
            config,
            metrics,
            restart: RestartSignal::default(),
            publishes,
            registry,
            discovery_prefix: discovery_prefix.into(),
        }
    }

    /// Queue discovery announcements for `cfg` if discovery is enabled.
    ///
    /// The returned receiver completes once the announcements have been published
    /// (or publishing them failed).
    pub fn publish_discovery(&self, cfg: Configuration) -> Option<oneshot::Receiver<()>> {
        if !cfg.discovery_enabled {
            return None;
        }

        let messages: Result<Vec<Message>, _> = discovery::announcements(&cfg, &self.discovery_prefix)
            .iter()
            .map(|a| Message::json(a.topic.clone(), &a.payload))
            .collect();

        match messages {
            Ok(messages) => Some(self.queue_publish(cfg, messages, TARGET_DISCOVERY)),
            Err(e) => {
                tracing::error!(message = "unable to encode discovery announcements", error = %e);
                None
            }
        }
    }

    /// Queue messages for the publish task. Publishes happen one at a time in the
    /// order they were queued so retained messages on the broker follow that order.
    fn queue_publish(&self, cfg: Configuration, messages: Vec<Message>, target: &'static str) -> oneshot::Receiver<()> {
        let (done, published) = oneshot::channel();
        let job = PublishJob {
            cfg,
            messages,
            target,
            done,
        };

        if self.publishes.send(job).is_err() {
            tracing::error!(message = "publish task is not running, dropping messages", kind = target);
        }

        published
    }
}

/// Publish queued jobs until every sender is dropped. Failures are logged and counted, never returned.
async fn publish_worker(publisher: MqttPublisher, metrics: BridgeMetrics, mut jobs: mpsc::UnboundedReceiver<PublishJob>) {
    while let Some(job) = jobs.recv().await {
        match publisher.publish(&job.cfg, &job.messages).await {
            Ok(_) => {
                tracing::info!(message = "published to broker", kind = job.target, num_messages = job.messages.len());
            }
            Err(e) => {
                metrics.publish_failed(job.target);
                tracing::error!(message = "failed to publish to broker", kind = job.target, host = %job.cfg.broker_host, error = %e);
            }
        }

        let _ = job.done.send(());
    }
}

pub fn app(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route(UPLOAD_PATH, get(station_upload))
        .route("/", get(dashboard_page))
        .route("/api/live", get(live))
        .route("/api/config", get(current_config))
        .route("/save", post(save_config))
        .route("/restart", post(restart))
        .route("/metrics", get(text_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn station_upload(
    State(context): State<Arc<RequestContext>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Html<&'static str> {
    let res = normalize(&raw_params(pairs));
    tracing::info!(message = "received station upload", num_fields = res.observation.len());

    // Update what the dashboard sees before and independently of publishing.
    context.state.set(Snapshot::now(res.display));
    context.metrics.observe(&res.observation);

    let cfg = context.config.get();
    match Message::json(cfg.topic.clone(), &res.observation) {
        Ok(msg) => {
            context.queue_publish(cfg, vec![msg], TARGET_STATE);
        }
        Err(e) => {
            tracing::error!(message = "unable to encode observation", error = %e);
        }
    }

    Html("SUCCESS")
}

async fn dashboard_page(State(context): State<Arc<RequestContext>>) -> Html<String> {
    Html(dashboard::render(&context.config.get()))
}

async fn live(State(context): State<Arc<RequestContext>>) -> Json<Snapshot> {
    Json(context.state.get().as_ref().clone())
}

async fn current_config(State(context): State<Arc<RequestContext>>) -> Json<Configuration> {
    Json(context.config.get())
}

async fn save_config(State(context): State<Arc<RequestContext>>, Form(form): Form<ConfigForm>) -> Response {
    let cfg = match Configuration::try_from(form) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(message = "rejected configuration", error = %e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    if let Err(e) = context.config.save(cfg.clone()) {
        tracing::error!(message = "failed to persist configuration", error = %e);
    }

    context.publish_discovery(cfg);
    Redirect::to("/").into_response()
}

async fn restart(State(context): State<Arc<RequestContext>>) -> Redirect {
    tracing::warn!(message = "restart requested, shutting down");
    context.restart.request();
    Redirect::to("/")
}

async fn text_metrics(State(context): State<Arc<RequestContext>>) -> Response {
    let mut buf = String::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", num_bytes = buf.len());
            ([(CONTENT_TYPE, OPENMETRICS_FORMAT)], buf).into_response()
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics", error = %e);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
