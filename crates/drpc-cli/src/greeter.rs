//! The sample `Greeter` service used by the demo.

use drpc::core::{RemoteFault, RpcResult};
use drpc::rpc::{MethodTable, RemoteService, ServiceInvoker};

pub const SERVICE_NAME: &str = "demo.Greeter";

/// Client-side stand-in.
pub struct Greeter {
    invoker: ServiceInvoker,
}

impl RemoteService for Greeter {
    const NAME: &'static str = SERVICE_NAME;
    const METHODS: &'static [&'static str] = &["greet", "add"];

    fn from_invoker(invoker: ServiceInvoker) -> Self {
        Self { invoker }
    }
}

impl Greeter {
    pub async fn greet(&self, name: &str) -> RpcResult<String> {
        self.invoker.invoke("greet", (name,)).await
    }

    pub async fn add(&self, a: i64, b: i64) -> RpcResult<i64> {
        self.invoker.invoke("add", (a, b)).await
    }
}

/// Server-side implementation for the provider at `address`.
pub fn methods(address: String) -> MethodTable {
    MethodTable::new()
        .method("greet", move |(name,): (String,)| {
            let address = address.clone();
            async move {
                if name.is_empty() {
                    return Err(RemoteFault::bad_arguments("name is empty"));
                }
                Ok(format!("Hello, {}! (from {})", name, address))
            }
        })
        .method("add", |(a, b): (i64, i64)| async move {
            a.checked_add(b)
                .ok_or_else(|| RemoteFault::new("Overflow", format!("{} + {} overflows", a, b)))
        })
}
