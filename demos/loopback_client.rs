//! A headless rig observed through the bridge: a loopback client watches
//! moment estimates, retunes the analysis mid-run, then stops the rig.
//!
//! Run with `RUST_LOG=info cargo run --example loopback_client`.

use fluxbus::{
    computation, factory, sampling, Config, ComputationSettings, RouterBuilder, SamplingSettings,
    Variant,
};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let sampler = factory::sampling(Variant::Virtual, SamplingSettings::default(), None)?;
    let calc = factory::computation(
        Variant::Virtual,
        ComputationSettings {
            nsig: 256,
            ..ComputationSettings::default()
        },
    );
    let (bridge, clients) = factory::bridge(Variant::Virtual, None)?;
    let clients = clients.expect("virtual bridge always has a loopback handle");

    let router = RouterBuilder::new(Config::default())
        .component(sampler, &[sampling::topics::COMMAND])
        .component(
            calc,
            &[sampling::topics::DATA, computation::topics::COMMAND],
        )
        .component(bridge, &[computation::topics::MOMENT_DATA])
        .build()?;

    let handle = router.handle();
    let rig = tokio::spawn(router.run());

    let mut console = clients
        .connect("console")
        .await
        .expect("bridge accepts the first client");

    // Watch a few moment estimates at the default window.
    for _ in 0..3 {
        if let Some(frame) = console.next_frame().await {
            println!("<- {frame}");
        }
    }

    // Retune: deeper FFT with a Hann window, exactly as a network client
    // would.
    let retune = r#"{"topic":"calc/command","payload":{"nsig":1024,"window":"hann"}}"#;
    println!("-> {retune}");
    console.send(retune).await;

    for _ in 0..2 {
        if let Some(frame) = console.next_frame().await {
            println!("<- {frame}");
        }
    }

    handle.shutdown();
    match rig.await? {
        Ok(()) => println!("rig stopped gracefully"),
        Err(e) => println!("rig stopped with error: {e}"),
    }

    Ok(())
}
