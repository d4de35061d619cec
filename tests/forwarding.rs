//! Proxies against a recording connection: what reaches the invoke primitive.

use futures::future;
use hubproxy::{
    analyze, contract, create_proxy, CancellationToken, Completion, Connection, ConnectionState,
    Contract, Error, HubProxy, Invocation, MemberKind, ResolveError, Value,
};
use std::sync::{Arc, Mutex};

contract! {
    pub trait Greeter {
        fn greet(&self, name: String, times: i64) -> Completion<String>;
        fn poke(&self) -> Completion;
        fn wait(&self, cancel: CancellationToken) -> Completion;

        fn greet_world(&self) -> Completion<String> {
            self.greet("world".into(), 1)
        }
    }
}

contract! {
    /// Eleven arguments: one more than any standard overload takes.
    pub trait TooWide {
        fn ping(&self) -> Completion;
        fn wide(
            &self,
            a: i64, b: i64, c: i64, d: i64, e: i64, f: i64,
            g: i64, h: i64, i: i64, j: i64, k: i64
        ) -> Completion;
    }
}

contract! {
    pub trait Annotated: HubProxy {
        fn ping(&self) -> Completion;

        fn shout(&self, words: &str) -> String {
            words.to_uppercase()
        }
    }
}

struct Recorder {
    state: ConnectionState,
    reply: Value,
    seen: Mutex<Vec<Invocation>>,
}

impl Connection for Recorder {
    fn state(&self) -> ConnectionState {
        self.state
    }

    fn send_invocation(&self, invocation: Invocation) -> Completion<Value> {
        self.seen.lock().unwrap().push(invocation);
        Box::pin(future::ready(Ok(self.reply.clone())))
    }
}

fn recorder(state: ConnectionState, reply: Value) -> (Arc<Recorder>, Arc<dyn Connection>) {
    let recorder = Arc::new(Recorder {
        state,
        reply,
        seen: Mutex::default(),
    });
    let connection: Arc<dyn Connection> = recorder.clone();
    (recorder, connection)
}

#[tokio::test]
async fn forwards_name_and_arguments_in_order() {
    let (recorder, connection) = recorder(ConnectionState::Connected, Value::from("hi bob"));
    let greeter = create_proxy::<dyn Greeter>(&connection).unwrap();

    assert_eq!(greeter.greet("bob".into(), 3).await.unwrap(), "hi bob");

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(&*seen[0].method, "greet");
    assert_eq!(seen[0].args, [Value::from("bob"), Value::Int(3)]);
    assert!(seen[0].cancel.is_none());
    assert_eq!(seen[0].arg_count(), 4);
}

#[tokio::test]
async fn zero_argument_calls_pass_exactly_two_arguments() {
    let (recorder, connection) = recorder(ConnectionState::Connected, Value::Nil);
    let greeter = create_proxy::<dyn Greeter>(&connection).unwrap();

    greeter.poke().await.unwrap();

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(&*seen[0].method, "poke");
    assert!(seen[0].args.is_empty());
    assert_eq!(seen[0].arg_count(), 2);
}

#[tokio::test]
async fn provided_methods_can_call_dispatched_ones() {
    let (recorder, connection) = recorder(ConnectionState::Connected, Value::from("hi world"));
    let greeter = create_proxy::<dyn Greeter>(&connection).unwrap();

    assert_eq!(greeter.greet_world().await.unwrap(), "hi world");

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(&*seen[0].method, "greet");
    assert_eq!(seen[0].args, [Value::from("world"), Value::Int(1)]);
}

#[tokio::test]
async fn cancellation_token_is_forwarded_as_given() {
    let (recorder, connection) = recorder(ConnectionState::Connected, Value::Nil);
    let greeter = create_proxy::<dyn Greeter>(&connection).unwrap();

    let token = CancellationToken::new();
    greeter.wait(token.clone()).await.unwrap();
    token.cancel();

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen[0].arg_count(), 3);
    let forwarded = seen[0].cancel.as_ref().unwrap();
    assert!(forwarded.is_cancelled());
}

#[test]
fn requires_a_connected_connection() {
    for state in [ConnectionState::Disconnected, ConnectionState::Faulted] {
        let (recorder, connection) = recorder(state, Value::Nil);
        let err = create_proxy::<dyn Greeter>(&connection).err().unwrap();
        assert!(matches!(err, Error::NotConnected(s) if s == state));
        assert!(recorder.seen.lock().unwrap().is_empty());
    }
}

#[test]
fn unsupported_arity_fails_construction() {
    let (recorder, connection) = recorder(ConnectionState::Connected, Value::Nil);
    let err = create_proxy::<dyn TooWide>(&connection).err().unwrap();

    assert!(err.to_string().contains("`wide`"), "{err}");
    assert!(matches!(
        err,
        Error::Resolve(ResolveError::NoMatchingOverload {
            arity: 13,
            generic: false,
            ..
        })
    ));
    assert!(recorder.seen.lock().unwrap().is_empty());
}

#[test]
fn generated_member_table_describes_every_member() {
    let info = <dyn Annotated as Contract>::describe();
    assert_eq!(info.name(), "Annotated");
    assert!(info.exposes_connection());

    let kinds: Vec<_> = info.members().iter().map(|m| (m.name, m.kind)).collect();
    assert_eq!(
        kinds,
        [
            ("connection", MemberKind::Accessor),
            ("ping", MemberKind::Method),
            ("shout", MemberKind::Method),
        ]
    );

    let dispatchable: Vec<_> = analyze(&info)
        .into_iter()
        .map(|d| d.name.to_string())
        .collect();
    assert_eq!(dispatchable, ["ping"]);
}

#[test]
fn provided_methods_stay_local() {
    let (recorder, connection) = recorder(ConnectionState::Connected, Value::Nil);
    let annotated = create_proxy::<dyn Annotated>(&connection).unwrap();

    assert_eq!(annotated.shout("quiet"), "QUIET");
    assert!(recorder.seen.lock().unwrap().is_empty());
    assert!(Arc::ptr_eq(annotated.connection(), &connection));
}
