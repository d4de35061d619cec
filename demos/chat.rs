use hubproxy::{contract, Completion, Hub};
use std::{
    error::Error,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{task, time};
use tracing_subscriber::EnvFilter;

contract! {
    pub trait Chat {
        fn send(&self, user: String, message: String) -> Completion<i64>;
        fn history(&self) -> Completion<Vec<String>>;

        fn say(&self, user: &str, message: &str) -> Completion<i64> {
            self.send(user.to_owned(), message.to_owned())
        }
    }
}

fn chat_hub() -> Hub {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let history = log.clone();
    Hub::new()
        .try_method("send", move |(user, message): (String, String)| {
            let log = log.clone();
            async move {
                if message.is_empty() {
                    return Err("empty message");
                }
                let mut log = log.lock().map_err(|_| "chat log poisoned")?;
                log.push(format!("<{user}> {message}"));
                Ok(log.len() as i64)
            }
        })
        .try_method("history", move |()| {
            let history = history.clone();
            async move {
                history
                    .lock()
                    .map(|log| log.clone())
                    .map_err(|_| "chat log poisoned")
            }
        })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    task::spawn(chat_hub().serve_tcp("127.0.0.1:8889"));
    time::sleep(Duration::from_millis(10)).await;

    let alice = hubproxy::connect::<dyn Chat>("127.0.0.1:8889").await?;
    let bob = hubproxy::connect::<dyn Chat>("127.0.0.1:8889").await?;

    alice.say("alice", "hi bob").await?;
    bob.say("bob", "hi alice").await?;
    if let Err(e) = bob.say("bob", "").await {
        println!("bob's empty message was refused: {e}");
    }

    for line in alice.history().await? {
        println!("{line}");
    }
    Ok(())
}
