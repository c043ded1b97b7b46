use std::future::Future;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{WebSocketStream, accept_async, accept_hdr_async};
use tokio_util::sync::CancellationToken;

use fishaudio::core::tts::{FinishReason, ProtocolEvent};
use fishaudio::{
    ApiErrorKind, BaseAudioStream, Client, ClientConfig, ClientError, Model, ReferenceAudio,
    StreamError, StreamParams, StreamState, WebSocketOptions,
};

type ServerWs = WebSocketStream<TcpStream>;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Accept one WebSocket connection and run `handler` on it.
///
/// Resolves to the handshake headers and the handler's result.
async fn serve_once<F, Fut, T>(handler: F) -> (Client, JoinHandle<(HeaderMap, T)>)
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut headers = HeaderMap::new();
        let ws = accept_hdr_async(tcp, |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            headers = req.headers().clone();
            Ok(resp)
        })
        .await
        .unwrap();
        let out = handler(ws).await;
        (headers, out)
    });

    let client = Client::new(
        ClientConfig::new("test-key").with_base_url(format!("http://{addr}")),
    )
    .unwrap();
    (client, handle)
}

async fn next_event(ws: &mut ServerWs) -> Option<ProtocolEvent> {
    while let Some(message) = ws.next().await {
        match message.ok()? {
            Message::Binary(data) => return Some(ProtocolEvent::decode(&data).unwrap()),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
    None
}

/// Read client events up to and including `stop`.
async fn read_until_stop(ws: &mut ServerWs) -> Vec<ProtocolEvent> {
    let mut events = Vec::new();
    while let Some(event) = next_event(ws).await {
        let done = event == ProtocolEvent::Stop;
        events.push(event);
        if done {
            break;
        }
    }
    events
}

async fn send(ws: &mut ServerWs, event: ProtocolEvent) {
    ws.send(Message::Binary(event.encode().unwrap().into()))
        .await
        .unwrap();
}

async fn finish(ws: &mut ServerWs, reason: FinishReason) {
    send(ws, ProtocolEvent::Finish { reason }).await;
}

/// Wait until the client tears the connection down.
async fn drain(ws: &mut ServerWs) {
    while let Some(Ok(message)) = ws.next().await {
        if message.is_close() {
            break;
        }
    }
}

fn text_source(fragments: &[&str]) -> impl futures::Stream<Item = String> + Send + 'static {
    futures::stream::iter(
        fragments
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
    )
}

#[tokio::test]
async fn test_basic_session() {
    let (client, server) = serve_once(|mut ws| async move {
        let events = read_until_stop(&mut ws).await;
        send(&mut ws, ProtocolEvent::audio(b"chunk1".to_vec())).await;
        send(&mut ws, ProtocolEvent::audio(b"chunk2".to_vec())).await;
        finish(&mut ws, FinishReason::Stop).await;
        drain(&mut ws).await;
        events
    })
    .await;

    let params = StreamParams::default().with_model(Model::S1);
    let stream = client
        .tts()
        .stream_websocket(text_source(&["Hello, ", "World!"]), &params, WebSocketOptions::default())
        .await
        .unwrap();

    let audio = tokio::time::timeout(TEST_TIMEOUT, stream.collect())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(audio.as_ref(), b"chunk1chunk2");
    assert_eq!(stream.state(), StreamState::Exhausted);

    let (headers, events) = tokio::time::timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
    assert_eq!(headers["authorization"], "Bearer test-key");
    assert_eq!(headers["model"], "s1");
    assert!(
        headers["user-agent"]
            .to_str()
            .unwrap()
            .starts_with("fish-audio/rust/")
    );

    assert_eq!(events.len(), 4);
    assert!(matches!(&events[0], ProtocolEvent::Start { .. }));
    assert_eq!(events[1], ProtocolEvent::text("Hello, "));
    assert_eq!(events[2], ProtocolEvent::text("World!"));
    assert_eq!(events[3], ProtocolEvent::Stop);
}

#[tokio::test]
async fn test_start_carries_merged_request() {
    let (client, server) = serve_once(|mut ws| async move {
        let start = next_event(&mut ws).await;
        finish(&mut ws, FinishReason::Stop).await;
        drain(&mut ws).await;
        start
    })
    .await;

    let params = StreamParams::default()
        .with_reference_id("voice-123")
        .with_format(fishaudio::AudioFormat::Pcm)
        .with_speed(1.25);
    let stream = client
        .tts()
        .stream_websocket(futures::stream::empty(), &params, WebSocketOptions::default())
        .await
        .unwrap();
    stream.collect().await.unwrap();

    let (headers, start) = tokio::time::timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
    assert!(headers.get("model").is_none());

    let Some(ProtocolEvent::Start { request }) = start else {
        panic!("expected start event, got {start:?}");
    };
    assert_eq!(request.reference_id.as_deref(), Some("voice-123"));
    assert_eq!(request.format, Some(fishaudio::AudioFormat::Pcm));
    assert_eq!(request.prosody.and_then(|p| p.speed), Some(1.25));
}

#[tokio::test]
async fn test_finish_with_error() {
    let (client, _server) = serve_once(|mut ws| async move {
        read_until_stop(&mut ws).await;
        send(&mut ws, ProtocolEvent::audio(b"partial".to_vec())).await;
        finish(&mut ws, FinishReason::Error).await;
        drain(&mut ws).await;
    })
    .await;

    let stream = client
        .tts()
        .stream_websocket(text_source(&["Hi"]), &StreamParams::default(), WebSocketOptions::default())
        .await
        .unwrap();

    let err = tokio::time::timeout(TEST_TIMEOUT, stream.collect())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(err, StreamError::protocol_finish());
    assert_eq!(err.to_string(), "stream finished with error");
    assert_eq!(stream.state(), StreamState::Failed);
    assert_eq!(stream.last_error(), Some(StreamError::protocol_finish()));
}

#[tokio::test]
async fn test_connection_refused_fails_synchronously() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        Client::new(ClientConfig::new("test-key").with_base_url(format!("http://{addr}"))).unwrap();
    let result = client
        .tts()
        .stream_websocket(text_source(&["Hi"]), &StreamParams::default(), WebSocketOptions::default())
        .await;

    assert!(matches!(result, Err(ClientError::Connection(_))));
}

#[tokio::test]
async fn test_handshake_rejection_is_classified() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let _ = accept_hdr_async(tcp, |_req: &Request, _resp: Response| -> Result<Response, ErrorResponse> {
            let rejection = Response::builder()
                .status(401)
                .body(Some("invalid api key".to_string()))
                .unwrap();
            Err(rejection)
        })
        .await;
    });

    let client =
        Client::new(ClientConfig::new("bad-key").with_base_url(format!("http://{addr}"))).unwrap();
    let result = client
        .tts()
        .stream_websocket(text_source(&["Hi"]), &StreamParams::default(), WebSocketOptions::default())
        .await;

    match result {
        Err(err) => assert_eq!(err.api_kind(), Some(ApiErrorKind::Authentication)),
        Ok(_) => panic!("expected handshake rejection"),
    }
}

#[tokio::test]
async fn test_handshake_timeout() {
    // Accept TCP but never answer the upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(tcp);
    });

    let client =
        Client::new(ClientConfig::new("test-key").with_base_url(format!("http://{addr}"))).unwrap();
    let options = WebSocketOptions::default().with_handshake_timeout(Duration::from_millis(100));
    let result = client
        .tts()
        .stream_websocket(text_source(&["Hi"]), &StreamParams::default(), options)
        .await;

    assert!(matches!(result, Err(ClientError::Connection(msg)) if msg.contains("timed out")));
    server.abort();
}

#[tokio::test]
async fn test_empty_audio_is_skipped() {
    let (client, _server) = serve_once(|mut ws| async move {
        read_until_stop(&mut ws).await;
        send(&mut ws, ProtocolEvent::audio(Vec::<u8>::new())).await;
        send(&mut ws, ProtocolEvent::audio(b"x".to_vec())).await;
        finish(&mut ws, FinishReason::Stop).await;
        drain(&mut ws).await;
    })
    .await;

    let stream = client
        .tts()
        .stream_websocket(text_source(&["Hi"]), &StreamParams::default(), WebSocketOptions::default())
        .await
        .unwrap();

    assert!(stream.advance().await);
    assert_eq!(stream.current().unwrap().as_ref(), b"x");
    assert!(!stream.advance().await);
    assert!(stream.last_error().is_none());
}

#[tokio::test]
async fn test_read_with_small_buffer() {
    let (client, _server) = serve_once(|mut ws| async move {
        read_until_stop(&mut ws).await;
        send(&mut ws, ProtocolEvent::audio(b"chunk1".to_vec())).await;
        send(&mut ws, ProtocolEvent::audio(b"chunk2".to_vec())).await;
        finish(&mut ws, FinishReason::Stop).await;
        drain(&mut ws).await;
    })
    .await;

    let stream = client
        .tts()
        .stream_websocket(text_source(&["Hi"]), &StreamParams::default(), WebSocketOptions::default())
        .await
        .unwrap();

    let mut out = Vec::new();
    let mut buf = [0u8; 4];
    loop {
        let n = tokio::time::timeout(TEST_TIMEOUT, stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }

    assert_eq!(out, b"chunk1chunk2");
    assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn test_normal_close_without_finish_is_clean() {
    let (client, _server) = serve_once(|mut ws| async move {
        read_until_stop(&mut ws).await;
        send(&mut ws, ProtocolEvent::audio(b"a".to_vec())).await;
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            }))
            .await;
        drain(&mut ws).await;
    })
    .await;

    let stream = client
        .tts()
        .stream_websocket(text_source(&["Hi"]), &StreamParams::default(), WebSocketOptions::default())
        .await
        .unwrap();

    let audio = tokio::time::timeout(TEST_TIMEOUT, stream.collect())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(audio.as_ref(), b"a");
}

#[tokio::test]
async fn test_abnormal_close_is_transport_error() {
    let (client, _server) = serve_once(|mut ws| async move {
        read_until_stop(&mut ws).await;
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Error,
                reason: "internal failure".into(),
            }))
            .await;
        drain(&mut ws).await;
    })
    .await;

    let stream = client
        .tts()
        .stream_websocket(text_source(&["Hi"]), &StreamParams::default(), WebSocketOptions::default())
        .await
        .unwrap();

    let err = tokio::time::timeout(TEST_TIMEOUT, stream.collect())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, StreamError::Transport(msg) if msg.contains("1011")));
}

#[tokio::test]
async fn test_unexpected_server_event_is_decode_error() {
    let (client, _server) = serve_once(|mut ws| async move {
        read_until_stop(&mut ws).await;
        send(&mut ws, ProtocolEvent::text("echo")).await;
        drain(&mut ws).await;
    })
    .await;

    let stream = client
        .tts()
        .stream_websocket(text_source(&["Hi"]), &StreamParams::default(), WebSocketOptions::default())
        .await
        .unwrap();

    assert!(!tokio::time::timeout(TEST_TIMEOUT, stream.advance()).await.unwrap());
    assert!(matches!(stream.last_error(), Some(StreamError::Decode(_))));
}

#[tokio::test]
async fn test_slow_consumer_receives_every_chunk_in_order() {
    const CHUNKS: usize = 250;

    let (client, _server) = serve_once(|mut ws| async move {
        read_until_stop(&mut ws).await;
        for i in 0..CHUNKS {
            send(&mut ws, ProtocolEvent::audio(format!("{i:04}").into_bytes())).await;
        }
        finish(&mut ws, FinishReason::Stop).await;
        drain(&mut ws).await;
    })
    .await;

    let stream = client
        .tts()
        .stream_websocket(text_source(&["Hi"]), &StreamParams::default(), WebSocketOptions::default())
        .await
        .unwrap();

    // Let the server outrun the audio queue
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut received = Vec::new();
    while tokio::time::timeout(TEST_TIMEOUT, stream.advance()).await.unwrap() {
        received.push(String::from_utf8(stream.current().unwrap().to_vec()).unwrap());
    }

    assert!(stream.last_error().is_none());
    assert_eq!(received.len(), CHUNKS);
    for (i, chunk) in received.iter().enumerate() {
        assert_eq!(chunk, &format!("{i:04}"));
    }
}

#[tokio::test]
async fn test_text_from_channel_is_sent_in_order() {
    let (client, server) = serve_once(|mut ws| async move {
        let events = read_until_stop(&mut ws).await;
        finish(&mut ws, FinishReason::Stop).await;
        drain(&mut ws).await;
        events
    })
    .await;

    let (tx, rx) = futures::channel::mpsc::unbounded::<String>();
    let stream = client
        .tts()
        .stream_websocket(rx, &StreamParams::default(), WebSocketOptions::default())
        .await
        .unwrap();

    for fragment in ["one ", "two ", "three"] {
        tx.unbounded_send(fragment.to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    drop(tx);

    tokio::time::timeout(TEST_TIMEOUT, stream.collect())
        .await
        .unwrap()
        .unwrap();

    let (_, events) = tokio::time::timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
    let texts: Vec<ProtocolEvent> = events[1..events.len() - 1].to_vec();
    assert_eq!(
        texts,
        vec![
            ProtocolEvent::text("one "),
            ProtocolEvent::text("two "),
            ProtocolEvent::text("three"),
        ]
    );
    assert_eq!(events.last(), Some(&ProtocolEvent::Stop));
}

#[tokio::test]
async fn test_close_tears_down_connection() {
    let (client, server) = serve_once(|mut ws| async move {
        next_event(&mut ws).await;
        send(&mut ws, ProtocolEvent::audio(b"first".to_vec())).await;
        // Keeps streaming until the client goes away
        drain(&mut ws).await;
        true
    })
    .await;

    let stream = client
        .tts()
        .stream_websocket(
            futures::stream::pending::<String>(),
            &StreamParams::default(),
            WebSocketOptions::default(),
        )
        .await
        .unwrap();

    assert!(tokio::time::timeout(TEST_TIMEOUT, stream.advance()).await.unwrap());
    stream.close().await.unwrap();
    stream.close().await.unwrap();
    assert!(!stream.advance().await);

    let (_, closed) = tokio::time::timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
    assert!(closed);
}

#[tokio::test]
async fn test_cancellation_stops_pending_advance() {
    let (client, _server) = serve_once(|mut ws| async move {
        next_event(&mut ws).await;
        drain(&mut ws).await;
    })
    .await;

    let token = CancellationToken::new();
    let options = WebSocketOptions::default().with_cancellation(token.clone());
    let stream = client
        .tts()
        .stream_websocket(futures::stream::pending::<String>(), &StreamParams::default(), options)
        .await
        .unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    assert!(!tokio::time::timeout(TEST_TIMEOUT, stream.advance()).await.unwrap());
    assert_eq!(stream.last_error(), Some(StreamError::Cancelled));
}

#[tokio::test]
async fn test_plain_server_without_headers() {
    // A server that ignores headers entirely still gets a working session
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        read_until_stop(&mut ws).await;
        send(&mut ws, ProtocolEvent::audio(b"ok".to_vec())).await;
        finish(&mut ws, FinishReason::Stop).await;
        drain(&mut ws).await;
    });

    let client =
        Client::new(ClientConfig::new("test-key").with_base_url(format!("http://{addr}"))).unwrap();
    let stream = client
        .tts()
        .stream_websocket(text_source(&[]), &StreamParams::default(), WebSocketOptions::default())
        .await
        .unwrap();

    let chunks: Vec<_> = fishaudio::into_chunks(stream).collect().await;
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].as_ref().unwrap().as_ref(), b"ok");
}

/// Three audio frames followed by a terminal event, read by a consumer that
/// only starts pulling once everything has arrived.
async fn audio_then_terminal<F, Fut>(terminal: F) -> (Vec<Vec<u8>>, Option<StreamError>)
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let (client, _server) = serve_once(|mut ws| async move {
        read_until_stop(&mut ws).await;
        for chunk in [b"one", b"two", b"six"] {
            send(&mut ws, ProtocolEvent::audio(chunk.to_vec())).await;
        }
        terminal(ws).await;
    })
    .await;

    let stream = client
        .tts()
        .stream_websocket(text_source(&["Hi"]), &StreamParams::default(), WebSocketOptions::default())
        .await
        .unwrap();

    // Everything is decoded and queued before the first pull
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut delivered = Vec::new();
    while tokio::time::timeout(TEST_TIMEOUT, stream.advance()).await.unwrap() {
        delivered.push(stream.current().unwrap().to_vec());
    }
    assert_eq!(stream.state(), StreamState::Failed);
    (delivered, stream.last_error())
}

#[tokio::test]
async fn test_decoded_audio_is_delivered_before_finish_error() {
    let (delivered, error) = audio_then_terminal(|mut ws| async move {
        finish(&mut ws, FinishReason::Error).await;
        drain(&mut ws).await;
    })
    .await;

    assert_eq!(delivered, vec![b"one".to_vec(), b"two".to_vec(), b"six".to_vec()]);
    assert_eq!(error, Some(StreamError::protocol_finish()));
}

#[tokio::test]
async fn test_decoded_audio_is_delivered_before_abnormal_close() {
    let (delivered, error) = audio_then_terminal(|mut ws| async move {
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Error,
                reason: "boom".into(),
            }))
            .await;
        drain(&mut ws).await;
    })
    .await;

    assert_eq!(delivered, vec![b"one".to_vec(), b"two".to_vec(), b"six".to_vec()]);
    assert!(matches!(error, Some(StreamError::Transport(msg)) if msg.contains("1011")));
}

#[tokio::test]
async fn test_peer_dropping_mid_send_fails_stream() {
    let (client, server) = serve_once(|mut ws| async move {
        next_event(&mut ws).await;
        next_event(&mut ws).await;
        // Gone without a close handshake while text is still flowing
        drop(ws);
    })
    .await;

    let (tx, rx) = futures::channel::mpsc::unbounded::<String>();
    let feeder = tokio::spawn(async move {
        while tx.unbounded_send("more text ".to_string()).is_ok() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let stream = client
        .tts()
        .stream_websocket(rx, &StreamParams::default(), WebSocketOptions::default())
        .await
        .unwrap();

    assert!(!tokio::time::timeout(TEST_TIMEOUT, stream.advance()).await.unwrap());
    assert_eq!(stream.state(), StreamState::Failed);
    assert!(matches!(
        stream.last_error(),
        Some(StreamError::Send { .. } | StreamError::Transport(_))
    ));

    // Both paths have stopped, so the text source is released
    tokio::time::timeout(TEST_TIMEOUT, feeder).await.unwrap().unwrap();
    tokio::time::timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
    stream.close().await.unwrap();
}

#[tokio::test]
async fn test_stalled_start_write_hits_handshake_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        // Completes the upgrade, then never reads
        let _ws = accept_async(tcp).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    // Far larger than the loopback socket buffers
    let mut params = StreamParams::default();
    params
        .references
        .push(ReferenceAudio::new(vec![0u8; 32 * 1024 * 1024], "sample"));

    let client =
        Client::new(ClientConfig::new("test-key").with_base_url(format!("http://{addr}"))).unwrap();
    let options = WebSocketOptions::default().with_handshake_timeout(Duration::from_millis(500));
    let result = tokio::time::timeout(
        TEST_TIMEOUT,
        client
            .tts()
            .stream_websocket(text_source(&["Hi"]), &params, options),
    )
    .await
    .unwrap();

    assert!(matches!(result, Err(ClientError::Connection(msg)) if msg.contains("timed out")));
    server.abort();
}
