//! In-process walkthrough: providers register, a consumer discovers them
//! through pushed updates and calls them through invocation proxies.

use crate::greeter::{self, Greeter};
use anyhow::{bail, Context, Result};
use colored::Colorize;
use drpc::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DISCOVERY_WAIT: Duration = Duration::from_secs(2);

/// One provider process: its store session, registry and loopback endpoint.
struct Provider {
    entry: RegistryEntry,
    session: Arc<MemorySession>,
    registry: StoreRegistry,
    proxy: InvocationProxy,
    dispatcher: Arc<ResponseDispatcher>,
}

fn start_provider(store: &MemoryStore, config: &DrpcConfig, port: u16) -> Provider {
    let entry = RegistryEntry::new(
        format!("greeter-{}", port),
        greeter::SERVICE_NAME,
        "127.0.0.1",
        port,
    )
    .with_attribute("weight", 1);

    let session = Arc::new(store.connect());
    let registry = StoreRegistry::with_config(
        &config.registry,
        session.clone(),
        Arc::new(EventPublisher::new()),
    );

    let exporter = Arc::new(ServiceExporter::new());
    exporter.export(greeter::SERVICE_NAME, greeter::methods(entry.address()));

    let pending = Arc::new(PendingCallTable::new(config.invocation.max_pending_calls));
    let dispatcher = Arc::new(ResponseDispatcher::new(pending.clone()));
    let channel = LoopbackChannel::new(exporter, dispatcher.clone());
    let proxy = InvocationProxy::new(
        Arc::new(channel),
        pending,
        ProxyConfig::from(&config.invocation),
    );

    Provider {
        entry,
        session,
        registry,
        proxy,
        dispatcher,
    }
}

/// Wait until the directory shows `expected` providers.
async fn await_providers(directory: &ProviderDirectory, expected: usize) -> Result<Arc<[RegistryEntry]>> {
    let poll = async {
        loop {
            let providers = directory.providers(greeter::SERVICE_NAME);
            if providers.len() == expected {
                return providers;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(DISCOVERY_WAIT, poll)
        .await
        .with_context(|| format!("Directory never showed {} providers", expected))
}

fn print_providers(providers: &[RegistryEntry]) {
    for provider in providers {
        println!("    {} {}", "•".cyan(), provider);
    }
}

pub async fn run(config: &DrpcConfig, provider_count: u16, calls: u32) -> Result<()> {
    if provider_count == 0 {
        bail!("At least one provider is needed");
    }

    let store = MemoryStore::new();
    let publisher = Arc::new(EventPublisher::new());
    let directory = Arc::new(ProviderDirectory::new());
    publisher.subscribe(directory.clone());

    println!("{}", "drpc demo".bold());
    println!("  registry root: {}", config.registry.root);
    println!();

    // Consumer side
    let consumer = RegistryEntry::new("demo-client", greeter::SERVICE_NAME, "127.0.0.1", 0);
    let registry = StoreRegistry::with_config(
        &config.registry,
        Arc::new(store.connect()),
        publisher.clone(),
    );
    registry
        .subscribe(&consumer)
        .await
        .context("Failed to subscribe")?;
    println!("{} subscribed to {}", "✓".green(), greeter::SERVICE_NAME);

    // Providers join one by one; each join is pushed to the directory.
    let mut providers = Vec::new();
    for i in 0..provider_count {
        let port = 9000u16
            .checked_add(i)
            .context("Too many providers for the port range")?;
        let provider = start_provider(&store, config, port);
        provider
            .registry
            .register(&provider.entry)
            .await
            .with_context(|| format!("Failed to register {}", provider.entry))?;
        await_providers(&directory, providers.len() + 1).await?;
        println!("{} registered {}", "✓".green(), provider.entry);
        providers.push(provider);
    }

    let discovered = directory.providers(greeter::SERVICE_NAME);
    println!();
    println!("{} providers discovered:", discovered.len());
    print_providers(&discovered);

    // Calls go to providers in turn, looked up by address.
    let proxies: HashMap<String, Greeter> = providers
        .iter()
        .map(|p| (p.entry.address(), p.proxy.get_proxy::<Greeter>()))
        .collect();

    println!();
    for call in 0..calls {
        let target = &discovered[call as usize % discovered.len()];
        let greeter = proxies
            .get(&target.address())
            .with_context(|| format!("No channel to {}", target.address()))?;
        let reply = greeter
            .greet(&format!("call-{}", call))
            .await
            .with_context(|| format!("Call {} to {} failed", call, target.address()))?;
        println!("  {} {}", "→".cyan(), reply);
    }

    if let Some(first) = proxies.values().next() {
        match first.add(i64::MAX, 1).await {
            Err(RpcError::Remote(fault)) => {
                println!("  {} remote fault surfaced locally: {}", "→".cyan(), fault)
            }
            other => bail!("Expected a remote fault, got {:?}", other),
        }
    }

    // A provider crashes: its session expires and the ephemeral node goes.
    if let Some(crashed) = providers.first() {
        println!();
        println!("{} session of {} expired", "!".yellow(), crashed.entry.address());
        crashed.session.expire();
        let remaining = await_providers(&directory, providers.len() - 1).await?;
        println!("{} providers after expiry:", remaining.len());
        print_providers(&remaining);
    }

    // Unsubscribe; the next provider change ends the watch loop.
    registry
        .unsubscribe(&consumer)
        .await
        .context("Failed to unsubscribe")?;
    let late_port = 9000u16
        .checked_add(provider_count)
        .context("Too many providers for the port range")?;
    let late = start_provider(&store, config, late_port);
    late.registry
        .register(&late.entry)
        .await
        .with_context(|| format!("Failed to register {}", late.entry))?;
    println!("{} registered {} after unsubscribing", "✓".green(), late.entry);
    let state = tokio::time::timeout(DISCOVERY_WAIT, async {
        loop {
            match registry.subscription_state(&consumer) {
                Some(SubscriptionState::Active) | None => {
                    tokio::time::sleep(Duration::from_millis(10)).await
                }
                Some(state) => return state,
            }
        }
    })
    .await
    .context("Subscription did not end")?;

    let stale: u64 = providers.iter().map(|p| p.dispatcher.stale_count()).sum();
    println!();
    println!("{} subscription {}", "✓".green(), state);
    println!("  events published: {}", publisher.published_count());
    println!("  stale responses:  {}", stale);

    info!(
        providers = provider_count,
        calls,
        events = publisher.published_count(),
        "Demo finished"
    );
    Ok(())
}
