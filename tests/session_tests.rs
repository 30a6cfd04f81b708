//! End to end tests of the client against an in-process TLCP server.
//!
//! The server side is scripted: every test accepts WebSocket connections on a local port,
//! checks the requests the client sends and answers with the notifications a Lightstreamer
//! Server would send.

use futures_util::{SinkExt, StreamExt};
use lightstreamer_sdk::client::{
    ClientListener, ClientStatus, ConnectionType, DisconnectionType, LightstreamerClient,
};
use lightstreamer_sdk::subscription::{
    ChannelSubscriptionListener, Subscription, SubscriptionListener, SubscriptionMode,
};
use lightstreamer_sdk::utils::LightstreamerError;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;

const SUBPROTOCOL: &str = "TLCP-2.5.0.lightstreamer.com";
const WAIT: Duration = Duration::from_secs(5);

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Recorder(Arc<StdMutex<Vec<String>>>);

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl ClientListener for Recorder {
        fn on_status_change(&mut self, status: &ClientStatus) {
            self.push(status.to_string());
        }

        fn on_server_error(&mut self, code: i32, message: &str) {
            self.push(format!("error {} {}", code, message));
        }
    }

    impl SubscriptionListener for Recorder {
        fn on_subscription(&mut self) {
            self.push("subscribed".to_string());
        }

        fn on_unsubscription(&mut self) {
            self.push("unsubscribed".to_string());
        }
    }

    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_hdr_async(
            stream,
            |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
                assert_eq!(
                    request.headers().get("sec-websocket-protocol").unwrap(),
                    SUBPROTOCOL
                );
                response
                    .headers_mut()
                    .insert("sec-websocket-protocol", HeaderValue::from_static(SUBPROTOCOL));
                Ok(response)
            },
        )
        .await
        .unwrap()
    }

    async fn receive(ws: &mut WebSocketStream<TcpStream>) -> String {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.to_string(),
                Some(Ok(_)) => continue,
                other => panic!("expected a text message, got {:?}", other),
            }
        }
    }

    async fn send(ws: &mut WebSocketStream<TcpStream>, text: &str) {
        ws.send(Message::Text(text.into())).await.unwrap();
    }

    /// Value of a parameter of a `create_session` or `control` message.
    fn param(message: &str, name: &str) -> Option<String> {
        let (_, form) = message.split_once("\r\n")?;
        form.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }

    /// Opens a session: answers the WebSocket check and the session creation.
    async fn open_session(ws: &mut WebSocketStream<TcpStream>, session_id: &str) {
        assert_eq!(receive(ws).await, "wsok");
        send(ws, "WSOK").await;
        let create = receive(ws).await;
        assert!(create.starts_with("create_session\r\n"));
        assert_eq!(param(&create, "LS_adapter_set").as_deref(), Some("DEMO"));
        assert!(param(&create, "LS_cid").is_some());
        send(
            ws,
            &format!("CONOK,{},50000,5000,*\r\nSERVNAME,Test%20Server\r\nCLIENTIP,127.0.0.1", session_id),
        )
        .await;
    }

    /// Confirms the next `add` request and returns its subscription id.
    async fn confirm_add(ws: &mut WebSocketStream<TcpStream>) -> String {
        let add = receive(ws).await;
        assert_eq!(param(&add, "LS_op").as_deref(), Some("add"));
        assert_eq!(param(&add, "LS_mode").as_deref(), Some("MERGE"));
        let request_id = param(&add, "LS_reqId").unwrap();
        let subscription_id = param(&add, "LS_subId").unwrap();
        send(
            ws,
            &format!("REQOK,{}\r\nSUBOK,{},1,2", request_id, subscription_id),
        )
        .await;
        subscription_id
    }

    fn new_client(port: u16) -> LightstreamerClient {
        LightstreamerClient::new(
            Some(&format!("http://127.0.0.1:{}", port)),
            Some("DEMO"),
            None,
            None,
        )
        .unwrap()
    }

    fn new_subscription() -> Subscription {
        Subscription::new(
            SubscriptionMode::Merge,
            Some(vec!["item1".to_string()]),
            Some(vec!["last_price".to_string(), "stock_name".to_string()]),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_receive_and_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            open_session(&mut ws, "S1").await;
            let subscription_id = confirm_add(&mut ws).await;
            send(&mut ws, &format!("U,{},1,10.5|ACME", subscription_id)).await;
            let destroy = receive(&mut ws).await;
            assert_eq!(param(&destroy, "LS_op").as_deref(), Some("destroy"));
        });

        let recorder = Recorder::default();
        let mut client = new_client(port);
        client.add_listener(Box::new(recorder.clone()));
        let subscription = new_subscription();
        let (updates_listener, mut updates) = ChannelSubscriptionListener::create_channel();
        subscription.add_listener(Box::new(updates_listener));
        subscription.add_listener(Box::new(recorder.clone()));
        client.subscribe(&subscription).unwrap();

        let client = Arc::new(Mutex::new(client));
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(LightstreamerClient::connect(client.clone(), shutdown.clone()));

        let update = timeout(WAIT, updates.recv()).await.unwrap().unwrap();
        assert_eq!(update.get_item_name(), Some("item1"));
        assert_eq!(update.get_value("last_price").unwrap(), Some("10.5"));
        assert_eq!(update.get_value(2usize).unwrap(), Some("ACME"));
        assert!(update.is_value_changed("stock_name").unwrap());
        assert!(subscription.is_subscribed());
        {
            let guard = client.lock().await;
            assert_eq!(
                guard.get_status(),
                ClientStatus::Connected(ConnectionType::WsStreaming)
            );
            assert_eq!(
                guard.connection_details.get_session_id().map(String::as_str),
                Some("S1")
            );
            assert_eq!(
                guard.connection_details.get_server_socket_name().map(String::as_str),
                Some("Test Server")
            );
            assert_eq!(
                guard.connection_details.get_client_ip().map(String::as_str),
                Some("127.0.0.1")
            );
        }

        client.lock().await.disconnect();
        timeout(WAIT, task).await.unwrap().unwrap().unwrap();
        server.await.unwrap();

        assert!(subscription.is_active());
        assert!(!subscription.is_subscribed());
        assert_eq!(
            recorder.events(),
            vec![
                "CONNECTING",
                "CONNECTED:STREAM-SENSING",
                "CONNECTED:WS-STREAMING",
                "subscribed",
                "unsubscribed",
                "DISCONNECTED",
            ]
        );
    }

    #[tokio::test]
    async fn test_reconnects_and_resubscribes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let mut first = accept(&listener).await;
            open_session(&mut first, "S1").await;
            confirm_add(&mut first).await;
            first.close(None).await.unwrap();

            let mut second = accept(&listener).await;
            open_session(&mut second, "S2").await;
            let subscription_id = confirm_add(&mut second).await;
            send(&mut second, &format!("U,{},1,11|ACME", subscription_id)).await;
            let destroy = receive(&mut second).await;
            assert_eq!(param(&destroy, "LS_op").as_deref(), Some("destroy"));
        });

        let recorder = Recorder::default();
        let mut client = new_client(port);
        client.connection_options.set_retry_delay(100).unwrap();
        client.add_listener(Box::new(recorder.clone()));
        let subscription = new_subscription();
        let (updates_listener, mut updates) = ChannelSubscriptionListener::create_channel();
        subscription.add_listener(Box::new(updates_listener));
        subscription.add_listener(Box::new(recorder.clone()));
        client.subscribe(&subscription).unwrap();

        let client = Arc::new(Mutex::new(client));
        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(LightstreamerClient::connect(client.clone(), shutdown.clone()));

        let update = timeout(WAIT, updates.recv()).await.unwrap().unwrap();
        assert_eq!(update.get_value("last_price").unwrap(), Some("11"));
        assert_eq!(
            client
                .lock()
                .await
                .connection_details
                .get_session_id()
                .map(String::as_str),
            Some("S2")
        );

        shutdown.notify_one();
        timeout(WAIT, task).await.unwrap().unwrap().unwrap();
        server.await.unwrap();

        let events = recorder.events();
        assert!(events.contains(&"DISCONNECTED:WILL-RETRY".to_string()));
        assert_eq!(events.iter().filter(|event| *event == "subscribed").count(), 2);
        assert_eq!(events.last().map(String::as_str), Some("DISCONNECTED"));
    }

    #[tokio::test]
    async fn test_refused_session_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            assert_eq!(receive(&mut ws).await, "wsok");
            send(&mut ws, "WSOK").await;
            receive(&mut ws).await;
            send(&mut ws, "CONERR,2,Requested%20Adapter%20Set%20not%20available").await;
            // The client must not open another connection.
            assert!(timeout(Duration::from_millis(500), listener.accept()).await.is_err());
        });

        let recorder = Recorder::default();
        let mut client = new_client(port);
        client.connection_options.set_retry_delay(100).unwrap();
        client.add_listener(Box::new(recorder.clone()));
        let client = Arc::new(Mutex::new(client));

        let result = timeout(WAIT, LightstreamerClient::connect(client.clone(), Arc::new(Notify::new())))
            .await
            .unwrap();
        match result {
            Err(LightstreamerError::Server { code, message }) => {
                assert_eq!(code, 2);
                assert_eq!(message, "Requested Adapter Set not available");
            }
            other => panic!("expected a server error, got {:?}", other),
        }
        server.await.unwrap();

        assert!(
            recorder
                .events()
                .contains(&"error 2 Requested Adapter Set not available".to_string())
        );
        assert_eq!(
            client.lock().await.get_status(),
            ClientStatus::Disconnected(DisconnectionType::Stopped)
        );
    }
}
