//! Server Protocol Tests
//!
//! Raw frame exchanges with the reference server:
//! - Several requests over one connection
//! - Block length and range checks on the wire
//! - Oversized length fields close the connection

use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use step::integrity::md5_hex;
use step::protocol::constants::*;
use step::protocol::{read_frame, write_frame, Message, Operation, ReadPolicy};
use step::serve::{ServeOptions, StepServer};
use step::{Md5TokenStrategy, TokenStrategy};

async fn start_server(dir: &TempDir, max_frame_size: usize) -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let mut server = StepServer::new(ServeOptions {
		storage_dir: dir.path().to_path_buf(),
		block_size: 4,
		max_frame_size,
		..ServeOptions::default()
	})
	.unwrap();
	tokio::spawn(async move {
		let _ = server.run(listener).await;
	});
	addr
}

async fn roundtrip(stream: &mut TcpStream, request: &Message, payload: Option<&[u8]>) -> Message {
	write_frame(stream, request, payload, DEFAULT_MAX_FRAME_SIZE).await.unwrap();
	read_frame(stream, &ReadPolicy::default()).await.unwrap().unwrap().message
}

fn token() -> String {
	Md5TokenStrategy::default().issue("2254411")
}

fn upload(key: &str, block_index: u64) -> Message {
	Message::request(Operation::Upload)
		.with(FIELD_TOKEN, token())
		.with(FIELD_KEY, key)
		.with(FIELD_BLOCK_INDEX, block_index)
}

#[tokio::test]
async fn test_whole_upload_over_one_connection() {
	let dir = TempDir::new().unwrap();
	let addr = start_server(&dir, DEFAULT_MAX_FRAME_SIZE).await;
	let mut stream = TcpStream::connect(addr).await.unwrap();

	let login = Message::request(Operation::Login)
		.with(FIELD_USERNAME, "2254411")
		.with(FIELD_PASSWORD, md5_hex(b"2254411"));
	let response = roundtrip(&mut stream, &login, None).await;
	assert!(response.is_ok());
	assert_eq!(response.get_str(FIELD_OPERATION), Some("LOGIN"));
	assert_eq!(response.get_str(FIELD_DIRECTION), Some("RESPONSE"));
	assert_eq!(response.get_str(FIELD_TYPE), Some("AUTH"));

	let save = Message::request(Operation::Save)
		.with(FIELD_TOKEN, token())
		.with(FIELD_KEY, "six.bin")
		.with(FIELD_SIZE, 6u64);
	let plan = roundtrip(&mut stream, &save, None).await;
	assert_eq!(plan.get_u64(FIELD_TOTAL_BLOCK), Some(2));

	let first = roundtrip(&mut stream, &upload("six.bin", 0), Some(&b"abcd"[..])).await;
	assert!(first.is_ok());
	let last = roundtrip(&mut stream, &upload("six.bin", 1), Some(&b"ef"[..])).await;
	assert_eq!(last.get_str(FIELD_MD5), Some(md5_hex(b"abcdef").as_str()));

	let get = Message::request(Operation::Get).with(FIELD_TOKEN, token()).with(FIELD_KEY, "six.bin");
	let stored = roundtrip(&mut stream, &get, None).await;
	assert_eq!(stored.get_u64(FIELD_SIZE), Some(6));
	assert_eq!(stored.get_str(FIELD_MD5), Some(md5_hex(b"abcdef").as_str()));
}

#[tokio::test]
async fn test_block_checks_on_the_wire() {
	let dir = TempDir::new().unwrap();
	let addr = start_server(&dir, DEFAULT_MAX_FRAME_SIZE).await;
	let mut stream = TcpStream::connect(addr).await.unwrap();

	let response = roundtrip(&mut stream, &upload("nothing.bin", 0), Some(&b"abcd"[..])).await;
	assert_eq!(response.status(), Some(STATUS_NOT_FOUND));

	let save = Message::request(Operation::Save)
		.with(FIELD_TOKEN, token())
		.with(FIELD_KEY, "six.bin")
		.with(FIELD_SIZE, 6u64);
	roundtrip(&mut stream, &save, None).await;

	let short = roundtrip(&mut stream, &upload("six.bin", 0), Some(&b"abc"[..])).await;
	assert_eq!(short.status(), Some(STATUS_BAD_REQUEST));
	let beyond = roundtrip(&mut stream, &upload("six.bin", 2), Some(&b"ab"[..])).await;
	assert_eq!(beyond.status(), Some(STATUS_BAD_REQUEST));
	assert!(!beyond.status_msg().is_empty());
}

#[tokio::test]
async fn test_oversized_length_closes_connection() {
	let dir = TempDir::new().unwrap();
	let addr = start_server(&dir, 512).await;
	let mut stream = TcpStream::connect(addr).await.unwrap();

	let mut header = Vec::new();
	header.extend_from_slice(&1000u32.to_be_bytes());
	header.extend_from_slice(&0u32.to_be_bytes());
	stream.write_all(&header).await.unwrap();

	let policy = ReadPolicy { max_attempts: 1, ..ReadPolicy::default() };
	let reply = read_frame(&mut stream, &policy).await;
	assert!(matches!(reply, Ok(None) | Err(_)));

	// The server keeps accepting after dropping the bad connection
	let mut next = TcpStream::connect(addr).await.unwrap();
	let get = Message::request(Operation::Get).with(FIELD_TOKEN, token()).with(FIELD_KEY, "x.bin");
	let response = roundtrip(&mut next, &get, None).await;
	assert_eq!(response.status(), Some(STATUS_NOT_FOUND));
}

// vim: ts=4
