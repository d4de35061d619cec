use hubproxy::{contract, CancellationToken, Completion, Hub, HubProxy};
use std::{error::Error, time::Duration};
use tokio::{task, time};
use tracing_subscriber::EnvFilter;

contract! {
    pub trait Calculator: HubProxy {
        fn ping(&self) -> Completion;
        fn add(&self, a: i64, b: i64) -> Completion<i64>;
        fn div(&self, a: i64, b: i64) -> Completion<i64>;
        fn countdown(&self, from: i64, cancel: CancellationToken) -> Completion;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let hub = Hub::new()
        .method("ping", |()| async {})
        .method("add", |(a, b): (i64, i64)| async move { a + b })
        .try_method("div", |(a, b): (i64, i64)| async move {
            a.checked_div(b).ok_or("division by zero")
        })
        .method("countdown", |(from,): (i64,)| async move {
            for n in (1..=from).rev() {
                println!("hub: {n}");
                time::sleep(Duration::from_millis(100)).await;
            }
        });
    task::spawn(hub.serve_tcp("127.0.0.1:8888"));
    time::sleep(Duration::from_millis(10)).await;

    let calc = hubproxy::connect::<dyn Calculator>("tcp://127.0.0.1:8888").await?;
    calc.ping().await?;
    println!("connection is {:?}", calc.connection());
    println!("2 + 3 = {}", calc.add(2, 3).await?);

    match calc.div(1, 0).await {
        Ok(q) => println!("1 / 0 = {q}"),
        Err(e) => println!("1 / 0 failed: {e}"),
    }

    let cancel = CancellationToken::new();
    let countdown = calc.countdown(10, cancel.clone());
    time::sleep(Duration::from_millis(350)).await;
    cancel.cancel();
    println!("countdown: {:?}", countdown.await);

    Ok(())
}
