use std::time::Duration;

use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Talk to a provider relay the way an embedded frame does", long_about = None)]
struct Cli {
    /// WebSocket endpoint of the relay
    #[arg(short, long, default_value = "ws://127.0.0.1:8645/relay")]
    url: String,

    /// Base URL for the HTTP routes
    #[arg(long, default_value = "http://127.0.0.1:8645")]
    http: String,

    /// Origin presented on the WebSocket handshake
    #[arg(short, long, default_value = "http://localhost")]
    origin: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print announced providers and acknowledge each
    Providers {
        /// Seconds to wait for announcements
        #[arg(short, long, default_value_t = 3)]
        wait: u64,
    },
    /// Invoke a provider method and print the response
    Call {
        provider: String,
        method: String,
        /// JSON array of arguments
        args: Option<String>,
        #[arg(short, long, default_value_t = 30)]
        timeout: u64,
    },
    /// Subscribe to a provider event and print triggers until Ctrl-C
    Listen { provider: String, event: String },
    /// Show relay status
    Status,
    /// Fire an event on a fixture provider
    Emit {
        fixture: String,
        event: String,
        /// JSON payload
        data: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Providers { wait } => {
            let mut socket = connect(&cli.url, &cli.origin).await?;
            let deadline = tokio::time::sleep(Duration::from_secs(wait));
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    message = next_json(&mut socket) => {
                        let Some(message) = message? else { break };
                        if message["type"] != "PROVIDER_METADATA" {
                            continue;
                        }
                        println!("{}", serde_json::to_string_pretty(&message)?);
                        let ack = json!({
                            "type": "PROVIDER_ACKNOWLEDGMENT",
                            "providerName": message["providerName"],
                        });
                        send_json(&mut socket, &ack).await?;
                    }
                }
            }
            socket.close(None).await?;
        }
        Commands::Call { provider, method, args, timeout } => {
            let args: Value = match args {
                Some(raw) => serde_json::from_str(&raw)?,
                None => json!([]),
            };
            let request_id = uuid::Uuid::new_v4().to_string();
            let mut socket = connect(&cli.url, &cli.origin).await?;
            send_json(
                &mut socket,
                &json!({
                    "type": "CALL_METHOD",
                    "providerName": provider,
                    "methodName": method,
                    "args": args,
                    "requestId": request_id,
                }),
            )
            .await?;

            let response = tokio::time::timeout(Duration::from_secs(timeout), async {
                while let Some(message) = next_json(&mut socket).await? {
                    if message["type"] == "METHOD_RESPONSE" && message["requestId"] == request_id.as_str() {
                        return Ok::<_, Box<dyn std::error::Error>>(Some(message));
                    }
                }
                Ok(None)
            })
            .await;

            match response {
                Ok(Ok(Some(message))) => println!("{}", serde_json::to_string_pretty(&message)?),
                Ok(Ok(None)) => eprintln!("Error: relay closed the connection before responding"),
                Ok(Err(e)) => return Err(e),
                Err(_) => eprintln!("Error: no response within {}s", timeout),
            }
            socket.close(None).await?;
        }
        Commands::Listen { provider, event } => {
            let mut socket = connect(&cli.url, &cli.origin).await?;
            let subscription = json!({
                "type": "SUBSCRIBE_EVENT",
                "providerName": provider,
                "eventName": event,
            });
            send_json(&mut socket, &subscription).await?;
            eprintln!("Listening for {}.{} (Ctrl-C to stop)", provider, event);

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    message = next_json(&mut socket) => {
                        let Some(message) = message? else { break };
                        if message["type"] == "EVENT_TRIGGER" {
                            println!("{}", serde_json::to_string(&message["data"])?);
                        }
                    }
                }
            }

            let mut unsubscribe = subscription;
            unsubscribe["type"] = json!("UNSUBSCRIBE_EVENT");
            send_json(&mut socket, &unsubscribe).await?;
            socket.close(None).await?;
        }
        Commands::Status => {
            let res = reqwest::Client::new()
                .get(format!("{}/status", cli.http))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Emit { fixture, event, data } => {
            let res = reqwest::Client::new()
                .post(format!("{}/fixtures/{}/events/{}", cli.http, fixture, event))
                .body(data.unwrap_or_default())
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn connect(url: &str, origin: &str) -> Result<Socket, Box<dyn std::error::Error>> {
    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_str(origin)?);
    let (socket, _) = connect_async(request).await?;
    Ok(socket)
}

async fn send_json(socket: &mut Socket, message: &Value) -> Result<(), Box<dyn std::error::Error>> {
    socket.send(Message::Text(message.to_string().into())).await?;
    Ok(())
}

/// Next JSON text frame, or `None` once the socket closes.
async fn next_json(socket: &mut Socket) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    while let Some(frame) = socket.next().await {
        match frame? {
            Message::Text(text) => return Ok(Some(serde_json::from_str(text.as_str())?)),
            Message::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        eprintln!("Response: {}", text);
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
