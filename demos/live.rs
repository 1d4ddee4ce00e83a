//! Drive the interface against real hardware and print IMU messages to stdout.
//!
//! Usage: cargo run --example live -- [interface options, e.g. -r 20 -f body]
//! Runs for 30 seconds. Unplug and replug the sensor to watch recovery.

use spatial_pal::params::ParamDescriptor;
use spatial_pal::{
    Dtc, Host, ImuMessage, InterfaceMode, InterfaceSetup, PalInterface, ParamValue,
    ParameterStore, ReplayFilter, Result, SampleRecord, SpatialInterface,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Default)]
struct MapStore(HashMap<String, ParamValue>);

impl ParameterStore for MapStore {
    fn register(&mut self, descriptor: &ParamDescriptor) -> Result<()> {
        self.0
            .entry(descriptor.name.to_string())
            .or_insert_with(|| descriptor.default.clone());
        Ok(())
    }

    fn get(&self, name: &str) -> Option<ParamValue> {
        self.0.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: ParamValue) -> Result<()> {
        self.0.insert(name.to_string(), value);
        Ok(())
    }
}

struct StdoutHost {
    args: Vec<String>,
    fault: Option<Dtc>,
    published: u64,
    store: MapStore,
}

impl Host for StdoutHost {
    fn setup(&self) -> InterfaceSetup {
        InterfaceSetup {
            name: "spatial0".to_string(),
            mode: InterfaceMode::Live,
            args: self.args.clone(),
        }
    }

    fn sub_config(&self) -> Option<String> {
        None
    }

    fn raise_fault(&mut self, dtc: Dtc) {
        println!("!!! fault raised: {:?} (code {})", dtc, dtc.code());
        self.fault = Some(dtc);
    }

    fn clear_fault(&mut self, dtc: Dtc) {
        println!("--- fault cleared: {:?}", dtc);
        self.fault = None;
    }

    fn active_fault(&self) -> Option<Dtc> {
        self.fault
    }

    fn is_recording(&self) -> bool {
        false
    }

    fn log_record(&mut self, _record: &SampleRecord) -> Result<()> {
        Ok(())
    }

    fn publish(&mut self, msg: &ImuMessage) -> Result<()> {
        self.published += 1;
        // Print every ~50th message to avoid flooding the terminal
        if self.published % 50 == 1 {
            let a = &msg.linear_acceleration;
            let w = &msg.angular_velocity;
            println!(
                "seq={:<8} t={:<10.3} frame={}  acc=[{:+.3}, {:+.3}, {:+.3}]  gyro=[{:+.4}, {:+.4}, {:+.4}]",
                msg.header.seq,
                msg.sample_time.as_secs_f64(),
                msg.header.frame_id,
                a[0], a[1], a[2],
                w[0], w[1], w[2],
            );
        }
        Ok(())
    }

    fn register_replay_filter(&mut self, _filter: ReplayFilter) -> Result<()> {
        Ok(())
    }

    fn parameters(&mut self) -> &mut dyn ParameterStore {
        &mut self.store
    }
}

fn main() {
    env_logger::init();

    match spatial_pal::list_devices() {
        Ok(devices) => {
            println!("Found {} sensor(s):", devices.len());
            for (i, dev) in devices.iter().enumerate() {
                println!("  [{}] {}  serial={}", i, dev.product, dev.serial);
            }
        }
        Err(e) => eprintln!("Enumeration failed: {}", e),
    }

    let mut host = StdoutHost {
        args: std::env::args().skip(1).collect(),
        fault: None,
        published: 0,
        store: MapStore::default(),
    };
    let mut iface = SpatialInterface::with_hid();

    let status = iface.configure(&mut host);
    if !status.is_ok() {
        eprintln!("configure failed: {:?}", status);
        std::process::exit(1);
    }
    let status = iface.init(&mut host);
    if !status.is_ok() {
        eprintln!("init failed: {:?}", status);
        std::process::exit(1);
    }

    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(30) {
        if host.active_fault().is_none() {
            let _ = iface.poll_for_data(&mut host);
            let _ = iface.log_data(&mut host);
            let _ = iface.process_data(&mut host);
            let _ = iface.send_data(&mut host);
        } else {
            let _ = iface.handle_state(&mut host);
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "--- {} messages in {:.1}s ({:.1} Hz) ---",
        host.published,
        elapsed,
        host.published as f64 / elapsed
    );
    let _ = iface.release(&mut host);
}
