//! Integration tests for the notification path
//!
//! Covers the NGSI notifyContext handling end to end: subscription checks,
//! command dispatch, status reporting and the HTTP endpoints.

use ngsi_lora_agent::agent::Agent;
use ngsi_lora_agent::api::ApiServer;
use ngsi_lora_agent::converter::GenericConverter;
use ngsi_lora_agent::notify::NotificationRouter;
use ngsi_lora_agent::protocol::ngsi::NotifyContext;
use ngsi_lora_agent::provider::CommandStatus;
use ngsi_lora_agent::registry::InMemoryDeviceRegistry;
use ngsi_lora_agent::testing::mocks::{
    sample_device, MockContextBroker, MockDeviceProvider, MockUplinkTransport,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    agent: Arc<Agent>,
    router: NotificationRouter,
    broker: Arc<MockContextBroker>,
    provider: Arc<MockDeviceProvider>,
}

async fn harness_with_provider(provider: MockDeviceProvider) -> Harness {
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    let broker = Arc::new(MockContextBroker::new());
    let provider = Arc::new(provider);
    let transport = Arc::new(MockUplinkTransport::new());
    let agent = Arc::new(Agent::new(
        registry.clone(),
        broker.clone(),
        provider.clone(),
        transport,
        Duration::from_millis(50),
    ));
    agent
        .start(Arc::new(GenericConverter::new()))
        .await
        .unwrap();
    let router = NotificationRouter::new(agent.clone(), registry.clone(), broker.clone());
    Harness {
        agent,
        router,
        broker,
        provider,
    }
}

async fn harness() -> Harness {
    harness_with_provider(MockDeviceProvider::new()).await
}

fn notification(subscription_id: &str, attributes: serde_json::Value) -> NotifyContext {
    serde_json::from_value(json!({
        "subscriptionId": subscription_id,
        "originator": "localhost",
        "contextResponses": [{
            "contextElement": {
                "type": "Lamp",
                "isPattern": "false",
                "id": "entity-0018B2000000170B",
                "attributes": attributes
            },
            "statusCode": { "code": "200", "reasonPhrase": "OK" }
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn test_command_notification_reports_sent_status() {
    let h = harness().await;
    h.agent
        .register(&sample_device("0018B2000000170B", &["led"]))
        .await
        .unwrap();

    let notification = notification(
        "sub-1",
        json!([{ "name": "led_command", "type": "command", "value": "on" }]),
    );
    let response = h.router.handle("0018B2000000170B", notification).await;

    assert!(response.response_code.is_ok());
    let commands = h.provider.get_registered_commands().await;
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].1.data, "on");

    let updates = h.broker.get_updated_attributes().await;
    assert_eq!(updates.len(), 1);
    let (entity, attributes) = &updates[0];
    assert_eq!(entity.id, "entity-0018B2000000170B");
    assert_eq!(attributes.len(), 1);
    assert_eq!(attributes[0].name, "led_commandStatus");
    assert_eq!(attributes[0].attribute_type, "commandStatus");
    assert_eq!(attributes[0].value, json!("SENT"));
    assert_eq!(attributes[0].metadatas[0].name, "commandDate");
}

#[tokio::test]
async fn test_status_update_failure_is_absorbed() {
    let h = harness().await;
    h.agent
        .register(&sample_device("0018B2000000170B", &["led"]))
        .await
        .unwrap();
    h.broker.set_update_failure(true);

    let notification = notification(
        "sub-1",
        json!([{ "name": "led_command", "type": "command", "value": "on" }]),
    );
    let response = h.router.handle("0018B2000000170B", notification).await;

    // The command still reaches the provider and the caller still gets a 200.
    assert!(response.response_code.is_ok());
    assert_eq!(h.provider.get_registered_commands().await.len(), 1);
    assert!(h.broker.get_updated_attributes().await.is_empty());
}

#[tokio::test]
async fn test_subscription_id_comparison_ignores_case() {
    let h = harness().await;
    h.agent
        .register(&sample_device("0018B2000000170B", &["led"]))
        .await
        .unwrap();

    let notification = notification(
        "SUB-1",
        json!([{ "name": "led_command", "type": "command", "value": "on" }]),
    );
    let response = h.router.handle("0018B2000000170B", notification).await;

    assert!(response.response_code.is_ok());
    assert_eq!(h.provider.get_registered_commands().await.len(), 1);
}

#[tokio::test]
async fn test_stale_subscription_is_cancelled() {
    let h = harness().await;
    h.agent
        .register(&sample_device("0018B2000000170B", &["led"]))
        .await
        .unwrap();

    let notification = notification(
        "sub-99",
        json!([{ "name": "led_command", "type": "command", "value": "on" }]),
    );
    let response = h.router.handle("0018B2000000170B", notification).await;

    assert!(response.response_code.is_ok());
    assert!(h.provider.get_registered_commands().await.is_empty());
    assert_eq!(h.broker.get_cancelled_subscriptions().await, vec!["sub-99"]);
}

#[tokio::test]
async fn test_notification_for_unknown_device_cancels_subscription() {
    let h = harness().await;

    let notification = notification(
        "sub-7",
        json!([{ "name": "led_command", "type": "command", "value": "on" }]),
    );
    let response = h.router.handle("0018B2000000170B", notification).await;

    assert!(response.response_code.is_ok());
    assert_eq!(h.broker.get_cancelled_subscriptions().await, vec!["sub-7"]);
}

#[tokio::test]
async fn test_notification_without_responses_is_rejected() {
    let h = harness().await;
    let notification: NotifyContext = serde_json::from_value(json!({
        "subscriptionId": "sub-1",
        "originator": "localhost"
    }))
    .unwrap();

    let response = h.router.handle("0018B2000000170B", notification).await;

    assert_eq!(response.response_code.code, "400");
}

#[tokio::test]
async fn test_failed_elements_are_skipped() {
    let h = harness().await;
    h.agent
        .register(&sample_device("0018B2000000170B", &["led"]))
        .await
        .unwrap();

    let notification: NotifyContext = serde_json::from_value(json!({
        "subscriptionId": "sub-1",
        "contextResponses": [{
            "contextElement": {
                "type": "Lamp",
                "isPattern": "false",
                "id": "entity-0018B2000000170B",
                "attributes": [{ "name": "led_command", "type": "command", "value": "on" }]
            },
            "statusCode": { "code": "404", "reasonPhrase": "Not Found" }
        }]
    }))
    .unwrap();
    let response = h.router.handle("0018B2000000170B", notification).await;

    assert!(response.response_code.is_ok());
    assert!(h.provider.get_registered_commands().await.is_empty());
}

#[tokio::test]
async fn test_non_command_attributes_are_ignored() {
    let h = harness().await;
    h.agent
        .register(&sample_device("0018B2000000170B", &["led"]))
        .await
        .unwrap();

    let notification = notification(
        "sub-1",
        json!([{ "name": "temperature", "type": "Integer", "value": 21 }]),
    );
    let response = h.router.handle("0018B2000000170B", notification).await;

    assert!(response.response_code.is_ok());
    assert!(h.provider.get_registered_commands().await.is_empty());
    assert!(h.broker.get_updated_attributes().await.is_empty());
}

#[tokio::test]
async fn test_multiple_commands_aggregate_into_one_update() {
    let h = harness().await;
    h.agent
        .register(&sample_device("0018B2000000170B", &["led", "buzzer"]))
        .await
        .unwrap();

    let notification = notification(
        "sub-1",
        json!([
            { "name": "led_command", "type": "command", "value": "on" },
            { "name": "buzzer_command", "type": "command", "value": "beep" }
        ]),
    );
    let response = h.router.handle("0018B2000000170B", notification).await;

    assert!(response.response_code.is_ok());
    assert_eq!(h.provider.get_registered_commands().await.len(), 2);

    let updates = h.broker.get_updated_attributes().await;
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.len(), 2);
}

#[tokio::test]
async fn test_provider_rejection_reports_error_status() {
    let h = harness_with_provider(MockDeviceProvider::with_status(CommandStatus::Error)).await;
    h.agent
        .register(&sample_device("0018B2000000170B", &["led"]))
        .await
        .unwrap();

    let notification = notification(
        "sub-1",
        json!([{ "name": "led_command", "type": "command", "value": "on" }]),
    );
    let response = h.router.handle("0018B2000000170B", notification).await;

    assert!(response.response_code.is_ok());
    let updates = h.broker.get_updated_attributes().await;
    assert_eq!(updates[0].1[0].value, json!("ERROR"));
}

mod http {
    use super::*;
    use warp::filters::BoxedFilter;

    async fn routes() -> BoxedFilter<(warp::reply::Response,)> {
        let registry = Arc::new(InMemoryDeviceRegistry::new());
        let broker = Arc::new(MockContextBroker::new());
        let provider = Arc::new(MockDeviceProvider::new());
        let transport = Arc::new(MockUplinkTransport::new());
        let agent = Arc::new(Agent::new(
            registry.clone(),
            broker.clone(),
            provider,
            transport,
            Duration::from_millis(50),
        ));
        agent
            .start(Arc::new(GenericConverter::new()))
            .await
            .unwrap();
        let router = Arc::new(NotificationRouter::new(
            agent.clone(),
            registry,
            broker,
        ));
        ApiServer::new(agent, router, 0).routes()
    }

    #[tokio::test]
    async fn test_register_endpoint_returns_created() {
        let routes = routes().await;

        let response = warp::test::request()
            .method("POST")
            .path("/agent/devices")
            .json(&json!({
                "deviceID": "0018B2000000170B",
                "port": 2,
                "entityName": "Lamp1",
                "entityType": "Lamp",
                "commands": ["led"]
            }))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), 201);
        assert_eq!(
            response.headers().get("Location").unwrap(),
            "/devices/0018B2000000170B"
        );
    }

    #[tokio::test]
    async fn test_register_endpoint_uppercase_prefix() {
        let routes = routes().await;

        let response = warp::test::request()
            .method("POST")
            .path("/AGENT/devices")
            .json(&json!({
                "deviceID": "0018B2000000170B",
                "port": 2,
                "entityName": "Lamp1",
                "entityType": "Lamp"
            }))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), 201);
    }

    #[tokio::test]
    async fn test_register_endpoint_incomplete_body() {
        let routes = routes().await;

        let response = warp::test::request()
            .method("POST")
            .path("/agent/devices")
            .json(&json!({ "deviceID": "0018B2000000170B" }))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), 500);
    }

    #[tokio::test]
    async fn test_unregister_endpoint() {
        let routes = routes().await;

        let created = warp::test::request()
            .method("POST")
            .path("/agent/devices")
            .json(&json!({
                "deviceID": "0018B2000000170B",
                "port": 2,
                "entityName": "Lamp1",
                "entityType": "Lamp"
            }))
            .reply(&routes)
            .await;
        assert_eq!(created.status(), 201);

        let deleted = warp::test::request()
            .method("DELETE")
            .path("/agent/devices/0018B2000000170B")
            .reply(&routes)
            .await;
        assert_eq!(deleted.status(), 204);
    }

    #[tokio::test]
    async fn test_unregister_unknown_device_endpoint() {
        let routes = routes().await;

        let response = warp::test::request()
            .method("DELETE")
            .path("/agent/devices/0018B2000000170B")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), 500);
    }

    #[tokio::test]
    async fn test_notify_endpoint_malformed_body_still_http_200() {
        let routes = routes().await;

        let response = warp::test::request()
            .method("POST")
            .path("/v1/notifyContext/0018B2000000170B")
            .body("{ not json")
            .reply(&routes)
            .await;

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["responseCode"]["code"], "400");
    }

    #[tokio::test]
    async fn test_notify_endpoint_ngsi10_prefix() {
        let routes = routes().await;

        let response = warp::test::request()
            .method("POST")
            .path("/NGSI10/notifyContext/0018B2000000170B")
            .json(&json!({
                "subscriptionId": "sub-1",
                "contextResponses": []
            }))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["responseCode"]["code"], "200");
    }
}
