//! Run the interface in replay mode with a synthetic recording fed from a thread.
//!
//! Usage: cargo run --example replay
//! Records for sensor 0 are diverted to the interface; records for sensor 1
//! are left to the host and counted separately.

use spatial_pal::params::ParamDescriptor;
use spatial_pal::{
    Dtc, Host, ImuMessage, InterfaceMode, InterfaceSetup, PalInterface, ParamValue,
    ParameterStore, ReplayFilter, Result, SampleRecord, SpatialInterface,
};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Default)]
struct ReplayHost {
    filters: Vec<ReplayFilter>,
    published: Vec<ImuMessage>,
    store: HashMap<String, ParamValue>,
}

impl ParameterStore for ReplayHost {
    fn register(&mut self, descriptor: &ParamDescriptor) -> Result<()> {
        self.store
            .entry(descriptor.name.to_string())
            .or_insert_with(|| descriptor.default.clone());
        Ok(())
    }

    fn get(&self, name: &str) -> Option<ParamValue> {
        self.store.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: ParamValue) -> Result<()> {
        self.store.insert(name.to_string(), value);
        Ok(())
    }
}

impl Host for ReplayHost {
    fn setup(&self) -> InterfaceSetup {
        InterfaceSetup {
            name: "spatial0".to_string(),
            mode: InterfaceMode::Replay,
            args: vec!["--frame".to_string(), "replayed_imu".to_string()],
        }
    }

    fn sub_config(&self) -> Option<String> {
        Some("[sensor]\nid = 0\n".to_string())
    }

    fn raise_fault(&mut self, dtc: Dtc) {
        println!("!!! fault raised: {:?}", dtc);
    }

    fn clear_fault(&mut self, _dtc: Dtc) {}

    fn active_fault(&self) -> Option<Dtc> {
        None
    }

    fn is_recording(&self) -> bool {
        false
    }

    fn log_record(&mut self, _record: &SampleRecord) -> Result<()> {
        Ok(())
    }

    fn publish(&mut self, msg: &ImuMessage) -> Result<()> {
        self.published.push(msg.clone());
        Ok(())
    }

    fn register_replay_filter(&mut self, filter: ReplayFilter) -> Result<()> {
        self.filters.push(filter);
        Ok(())
    }

    fn parameters(&mut self) -> &mut dyn ParameterStore {
        self
    }
}

fn main() {
    env_logger::init();

    let mut host = ReplayHost::default();
    let mut iface = SpatialInterface::with_hid();
    if !iface.configure(&mut host).is_ok() || !iface.init(&mut host).is_ok() {
        eprintln!("Interface failed to start");
        std::process::exit(1);
    }

    let Some(filter) = host.filters.first().cloned() else {
        eprintln!("No replay filter registered");
        std::process::exit(1);
    };

    let player = std::thread::spawn(move || {
        let mut passed_through = 0;
        for i in 0..200u64 {
            let record = SampleRecord {
                timestamp: Duration::from_millis(i * 8),
                sensor_id: (i % 2) as u32,
                accel: [0.0, 0.0, -9.80665],
                gyro: [0.01 * i as f64, 0.0, 0.0],
                valid: true,
            };
            if !filter.offer(record) {
                passed_through += 1;
            }
            std::thread::sleep(Duration::from_micros(500));
        }
        passed_through
    });

    while !player.is_finished() {
        let _ = iface.poll_for_data(&mut host);
        let _ = iface.process_data(&mut host);
        std::thread::sleep(Duration::from_micros(200));
    }
    // Drain whatever is still queued.
    while iface.poll_for_data(&mut host).is_ok() {
        let _ = iface.process_data(&mut host);
    }

    let passed_through = player.join().unwrap_or(0);
    println!(
        "Published {} replayed message(s), {} record(s) left to the host",
        host.published.len(),
        passed_through
    );
    if let Some(last) = host.published.last() {
        println!(
            "last: seq={} frame={} t={:?} gyro_x={:+.2}",
            last.header.seq, last.header.frame_id, last.sample_time, last.angular_velocity[0]
        );
    }
    let _ = iface.release(&mut host);
}
