//! Performance benchmarks for the codec and the request loop

use serde_json::json;
use server::{spawn_server, ServerConfig};
use shared::{encode_json, Action, Content, FrameParser};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

/// Benchmarks frame encoding
#[test]
fn benchmark_encode() {
    let content = json!({"action": "move", "player_name": "alice", "direction": "NE"});
    let iterations = 50_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = encode_json(&content).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Frame encoding: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 5);
}

/// Benchmarks reassembly and action decoding of a large pipelined buffer
#[test]
fn benchmark_parse_pipelined() {
    let frame = encode_json(&json!({"action": "attack", "player_name": "a", "target": "b"})).unwrap();
    let count = 50_000;
    let stream: Vec<u8> = frame.iter().copied().cycle().take(frame.len() * count).collect();

    let start = Instant::now();
    let mut parser = FrameParser::new();
    let mut decoded = 0;
    for chunk in stream.chunks(1500) {
        for frame in parser.push(chunk).unwrap() {
            if let Action::Attack { .. } = Action::from_content(&frame.content) {
                decoded += 1;
            }
        }
    }
    let duration = start.elapsed();
    println!(
        "Frame parsing: {} frames in {:?} ({:.2} μs/frame)",
        decoded,
        duration,
        duration.as_micros() as f64 / decoded as f64
    );

    assert_eq!(decoded, count);
    assert!(duration.as_secs() < 5);
}

/// Benchmarks request/reply throughput of a running server
#[test]
fn benchmark_pipelined_requests() {
    let server = spawn_server(ServerConfig::ephemeral()).unwrap();
    let mut stream = TcpStream::connect(server.addr()).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();

    let requests = 500;
    let frame = encode_json(&json!({"action": "get_state"})).unwrap();
    let batch: Vec<u8> = frame.iter().copied().cycle().take(frame.len() * requests).collect();

    let start = Instant::now();
    stream.write_all(&batch).unwrap();

    let mut parser = FrameParser::new();
    let mut replies = 0;
    let mut buf = [0u8; 8192];
    while replies < requests {
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "server closed after {replies} replies");
        for frame in parser.push(&buf[..n]).unwrap() {
            match frame.content {
                Content::Json(value) if value.get("result").is_some() => replies += 1,
                other => panic!("unexpected reply {other:?}"),
            }
        }
    }

    let duration = start.elapsed();
    println!(
        "Pipelined get_state: {} replies in {:?} ({:.2} μs/reply)",
        replies,
        duration,
        duration.as_micros() as f64 / replies as f64
    );

    assert!(duration.as_secs() < 10);
    server.stop().unwrap();
}
