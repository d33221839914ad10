//! A fully virtual magnetometer rig: every role simulated, no hardware.
//!
//! Run with `RUST_LOG=info,fluxbus=debug cargo run --example virtual_rig`;
//! stop with Ctrl-C and watch the grace-bounded shutdown.

use fluxbus::{
    actuation, computation, factory, sampling, Config, ComputationSettings, RouterBuilder,
    SamplingSettings, Variant, FAULT_TOPIC,
};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let sampler = factory::sampling(Variant::Virtual, SamplingSettings::default(), None)?;
    let motor = factory::actuation(Variant::Virtual, None)?;
    let panel = factory::interface(Variant::Virtual, None)?;
    let calc = factory::computation(Variant::Virtual, ComputationSettings::default());
    let (bridge, _clients) = factory::bridge(Variant::Virtual, None)?;

    let router = RouterBuilder::new(Config::default())
        .component(sampler, &[sampling::topics::COMMAND])
        .component(motor, &[actuation::topics::COMMAND])
        .component(
            calc,
            &[sampling::topics::DATA, computation::topics::COMMAND],
        )
        .component(
            panel,
            &[computation::topics::FFT_DATA, computation::topics::MOMENT_DATA],
        )
        .component(
            bridge,
            &[
                computation::topics::FFT_DATA,
                computation::topics::MOMENT_DATA,
                actuation::topics::STATUS,
                FAULT_TOPIC,
            ],
        )
        .build()?;

    match router.run().await {
        Ok(()) => println!("rig stopped gracefully"),
        Err(e) => println!("rig stopped with error: {e}"),
    }

    Ok(())
}
