//! End-to-end: a loopback TcpListener plays the vision producer.

use std::{
    io::{BufRead, BufReader, Cursor, Write},
    net::{TcpListener, TcpStream},
    thread,
    time::{Duration, Instant},
};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::{DynamicImage, ImageFormat, RgbImage};

use tracking_receiver::{
    ConnectionState, NormalizedPoint, ReceiverConfig, Role, TelemetrySample, TickDispatcher,
    TrackedPoint, TrackingReceiver, encode_frame,
};

const HEAD_JSON: &str = r#"{"head_position":{"normalized_x":0.5,"normalized_y":0.25},"frame_data":null}"#;

fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn config(role: Role, port: u16) -> ReceiverConfig {
    ReceiverConfig {
        port,
        role,
        read_poll_ms: 20,
        retry_backoff_ms: 50,
        connect_timeout_ms: 1_000,
        ready_timeout_ms: 5_000,
        ..ReceiverConfig::default()
    }
}

/// Accepts one consumer and runs the producer half of the ready exchange.
fn accept_ready(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().unwrap();
    stream.write_all(b"PYTHON_READY\n").unwrap();
    let mut line = String::new();
    BufReader::new(stream.try_clone().unwrap())
        .read_line(&mut line)
        .unwrap();
    assert_eq!(line, "UNITY_READY\n");
    stream
}

fn wait_for<T>(mut f: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(v) = f() {
            return v;
        }
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn head_position(sample: &TelemetrySample) -> NormalizedPoint {
    match sample {
        TelemetrySample::Head(h) => h.position.unwrap(),
        other => panic!("expected head sample, got {:?}", other),
    }
}

#[test]
fn head_sample_is_delivered_and_shutdown_is_prompt() {
    let (listener, port) = listener();
    let producer = thread::spawn(move || {
        let mut stream = accept_ready(&listener);
        stream.write_all(&encode_frame(HEAD_JSON.as_bytes())).unwrap();
        // Stay connected until the receiver goes away.
        let mut buf = [0u8; 16];
        let _ = std::io::Read::read(&mut stream, &mut buf);
    });

    let receiver = TrackingReceiver::new(config(Role::Head, port));
    receiver.connect().unwrap();

    let sample = wait_for(|| receiver.take_sample());
    assert_eq!(head_position(&sample), NormalizedPoint::new(0.5, 0.25));
    assert_eq!(receiver.state(), ConnectionState::Streaming);
    assert!(receiver.take_sample().is_none());

    let started = Instant::now();
    receiver.shutdown();
    receiver.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(receiver.state(), ConnectionState::Disconnected);
    drop(receiver);
    producer.join().unwrap();
}

#[test]
fn malformed_message_does_not_drop_the_session() {
    let (listener, port) = listener();
    let producer = thread::spawn(move || {
        let mut stream = accept_ready(&listener);
        stream.write_all(&encode_frame(b"{\"head_position\": oops")).unwrap();
        stream.write_all(&encode_frame(HEAD_JSON.as_bytes())).unwrap();
        thread::sleep(Duration::from_millis(500));
    });

    let receiver = TrackingReceiver::new(config(Role::Head, port));
    receiver.connect().unwrap();

    let sample = wait_for(|| receiver.take_sample());
    assert_eq!(head_position(&sample).x, 0.5);
    let status = receiver.status();
    assert_eq!(status.decode_errors, 1);
    assert_eq!(status.attempts, 1);

    receiver.shutdown();
    producer.join().unwrap();
}

#[test]
fn start_transmission_gate_and_early_data() {
    let (listener, port) = listener();
    let producer = thread::spawn(move || {
        let mut stream = accept_ready(&listener);
        // Sentinel and first frame in a single write.
        let mut bytes = b"START_TRANSMISSION\n".to_vec();
        bytes.extend(encode_frame(HEAD_JSON.as_bytes()));
        stream.write_all(&bytes).unwrap();
        thread::sleep(Duration::from_millis(500));
    });

    let receiver = TrackingReceiver::new(ReceiverConfig {
        await_start_transmission: true,
        ..config(Role::Head, port)
    });
    receiver.connect().unwrap();

    let sample = wait_for(|| receiver.take_sample());
    assert_eq!(head_position(&sample).y, 0.25);
    receiver.shutdown();
    producer.join().unwrap();
}

#[test]
fn reconnects_after_producer_restart() {
    let (listener, port) = listener();
    let producer = thread::spawn(move || {
        for x in [0.1f32, 0.9] {
            let mut stream = accept_ready(&listener);
            let json = format!(
                r#"{{"head_position":{{"normalized_x":{},"normalized_y":0.5}}}}"#,
                x
            );
            stream.write_all(&encode_frame(json.as_bytes())).unwrap();
            thread::sleep(Duration::from_millis(100));
            // Dropping the stream ends this session.
        }
        thread::sleep(Duration::from_millis(500));
    });

    let receiver = TrackingReceiver::new(config(Role::Head, port));
    receiver.connect().unwrap();

    wait_for(|| {
        receiver
            .take_sample()
            .filter(|s| head_position(s).x == 0.9)
    });
    assert!(receiver.status().attempts >= 2);

    receiver.shutdown();
    producer.join().unwrap();
}

#[test]
fn gives_up_after_max_attempts() {
    let port = {
        let (listener, port) = listener();
        drop(listener);
        port
    };
    let receiver = TrackingReceiver::new(ReceiverConfig {
        max_attempts: Some(2),
        retry_backoff_ms: 10,
        ..config(Role::Head, port)
    });
    receiver.connect().unwrap();

    wait_for(|| (!receiver.is_running()).then_some(()));
    let status = receiver.status();
    assert_eq!(status.state, ConnectionState::Failed);
    assert_eq!(status.attempts, 2);
    assert!(status.last_error.unwrap().contains("Gave up"));
}

#[test]
fn hands_sample_with_png_frame_reaches_the_tick() {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, image::Rgb([200, 10, 10])));
    let mut png = Cursor::new(Vec::new());
    img.write_to(&mut png, ImageFormat::Png).unwrap();
    let json = format!(
        r#"{{"hand_positions":{{"left":{{"normalized_x":0.25,"normalized_y":0.75}},"right":null}},"frame_data":"{}"}}"#,
        BASE64.encode(png.into_inner())
    );

    let (listener, port) = listener();
    let producer = thread::spawn(move || {
        let mut stream = accept_ready(&listener);
        stream.write_all(&encode_frame(json.as_bytes())).unwrap();
        thread::sleep(Duration::from_millis(500));
    });

    let receiver = TrackingReceiver::new(config(Role::Hands, port));
    receiver.connect().unwrap();
    wait_for(|| receiver.mailbox().has_new().then_some(()));

    let mut dispatcher = TickDispatcher::new(Role::Hands);
    let mut positions = Vec::new();
    let mut sizes = Vec::new();
    let report = dispatcher.tick(
        receiver.mailbox(),
        &mut |p: TrackedPoint, n: NormalizedPoint| positions.push((p, n)),
        &mut |f: DynamicImage| sizes.push((f.width(), f.height())),
    );

    assert!(report.new_sample && report.frame_updated);
    assert_eq!(sizes, vec![(8, 6)]);
    assert_eq!(positions, vec![(TrackedPoint::LeftHand, NormalizedPoint::new(0.25, 0.75))]);

    receiver.shutdown();
    producer.join().unwrap();
}
