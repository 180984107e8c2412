//! ringkv-client: interactive client for the store.
//!
//! Discovers the coordinator through the shared endpoint file, opens one
//! session, and turns `command:key[:value]` lines from stdin into wire
//! requests.

use ringkv_net::LineConn;
use ringkv_proto::{ack, id, req, Message};
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let coordinator = ringkv_config::read_endpoint(Path::new(ringkv_config::ENDPOINT_FILE))?;
    println!("connecting to coordinator at {}", coordinator);

    let mut conn = LineConn::connect(&coordinator).await?;

    let hello = conn.recv().await?.ok_or("coordinator closed the session")?;
    if !hello.is_ack(ack::CONNECTED) {
        return Err(format!("unexpected greeting: {}", hello.to_line()).into());
    }
    conn.send(&Message::identify(id::CLIENT)).await?;
    let ready = conn.recv().await?.ok_or("coordinator closed the session")?;
    if !ready.is_ack(ack::READY_TO_SERVE) {
        return Err(format!("coordinator not serving: {}", ready.to_line()).into());
    }

    println!("connected\n");
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("command >> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command.eq_ignore_ascii_case("exit") {
            break;
        }
        if command.eq_ignore_ascii_case("help") {
            print_help();
            continue;
        }

        let Some(request) = build_request(command) else {
            continue;
        };
        conn.send(&request).await?;
        let Some(reply) = conn.recv().await? else {
            println!("error: coordinator closed the session");
            break;
        };
        render_reply(&request.key, &reply);
    }

    println!("bye");
    Ok(())
}

/// Parse a `command:key[:value]` line into a request record.
fn build_request(command: &str) -> Option<Message> {
    let mut parts = command.splitn(3, ':');
    let cmd = parts.next()?.to_ascii_lowercase();
    let Some(key) = parts.next().filter(|k| !k.is_empty()) else {
        println!("error: expected <command>:<key>[:<value>]");
        return None;
    };
    let value = parts.next().unwrap_or("");

    match cmd.as_str() {
        "get" => Some(Message::request(req::GET, key)),
        "delete" => Some(Message::request(req::DELETE, key)),
        "put" | "update" => {
            if value.is_empty() {
                println!("error: {} requires a value", cmd);
                None
            } else {
                Some(Message::request(cmd, key).with_value(value))
            }
        }
        other => {
            println!("error: unknown command {:?} (try help)", other);
            None
        }
    }
}

fn render_reply(key: &str, reply: &Message) {
    if reply.req_type == req::DATA {
        println!("value of {:?} is: {}", key, reply.message);
        return;
    }
    match reply.message.as_str() {
        ack::PUT_SUCCESS => println!("stored {:?}", key),
        ack::UPDATE_SUCCESS => println!("updated {:?}", key),
        ack::DELETE_SUCCESS => println!("deleted {:?}", key),
        ack::KEY_ERROR => println!("key not found: {:?}", key),
        ack::NO_SERVERS_AVAILABLE => println!("error: no data nodes available"),
        ack::INSUFFICIENT_SERVERS => println!("error: not enough data nodes for replication"),
        other => println!("coordinator replied: {}", other),
    }
}

fn print_help() {
    println!("commands:");
    println!("  put:key:value     store a new pair");
    println!("  get:key           read a value");
    println!("  update:key:value  modify an existing pair");
    println!("  delete:key        remove a pair");
    println!("  help              show this help");
    println!("  exit              leave");
    println!();
}
