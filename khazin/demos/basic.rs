//! Walks through lifetimes, scopes, generics and disposal.
//!
//! Run with `RUST_LOG=khazin_container=debug` for the container's own logs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use khazin::prelude::*;
use khazin::telemetry::install_subscriber;
use tracing::info;

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        1_700_000_000
    }
}

struct Connection {
    id: u32,
}

impl Disposable for Connection {
    fn dispose(&self) {
        info!(id = self.id, "Connection closed");
    }
}

struct Handler {
    clock: Arc<dyn Clock>,
    connection: Arc<Connection>,
}

/// Marker for the open `Repository<_>` registration.
struct Repository;

fn main() -> Result<()> {
    install_subscriber("info");

    let connections = Arc::new(AtomicU32::new(0));
    let container = Container::builder()
        .strict_di(true)
        .instance(Arc::new(SystemClock) as Arc<dyn Clock>)
        .register(
            ServiceDescriptor::scoped::<Connection>({
                let connections = connections.clone();
                move |_| {
                    let id = connections.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(Connection { id }))
                }
            })
            .disposable::<Connection>(),
        )
        .register(ServiceDescriptor::activated::<Handler>(
            Lifetime::Transient,
            [ServiceKey::of::<dyn Clock>(), ServiceKey::of::<Connection>()],
            |args| {
                Ok(Arc::new(Handler {
                    clock: args.get(0)?,
                    connection: args.get(1)?,
                }))
            },
        ))
        .generic(
            GenericDefinition::of::<Repository>(),
            Lifetime::Singleton,
            |arguments| {
                let table = arguments[0].to_string();
                Ok(Specialization::factory(move |_, _| {
                    Ok(Instance::from_value(format!("repository of {table}")))
                }))
            },
        )
        .build()?;

    for request in ["first", "second"] {
        let scope = container.create_scope(Some(request))?;
        let handler: Arc<Handler> = scope.resolve()?;
        let again: Arc<Handler> = scope.resolve()?;
        info!(
            request,
            connection = handler.connection.id,
            shared = Arc::ptr_eq(&handler.connection, &again.connection),
            now = handler.clock.now(),
            "Handled request"
        );
    }

    let users = ServiceKey::new(
        GenericDefinition::of::<Repository>().construct([ServiceType::of::<Connection>()]),
        None,
    );
    let repository: Arc<String> = container.resolve_key(&users)?;
    info!(%users, repository = %repository, "Resolved generic");

    if let Err(error) = container.resolve::<u64>() {
        info!("Expected failure:\n{error}");
    }
    Ok(())
}
