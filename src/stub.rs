//! Bench-top telemetry generator for exercising the link without hardware.

use rand::Rng;

use crate::types::SensorReadings;

/// Representative healthy telemetry: charged battery, sunlit panels, room
/// temperature board.
pub fn read_all_sensors<R: Rng>(rng: &mut R) -> SensorReadings {
    let panel_voltage = rng.gen_range(7.0..8.5);
    let panel_current = rng.gen_range(0.3..0.8);
    let board_temp = 20.0 + rng.gen_range(-2.0_f64..6.0);

    let mut vec3 = |lo: f64, hi: f64| -> [f64; 3] {
        [rng.gen_range(lo..hi), rng.gen_range(lo..hi), rng.gen_range(lo..hi)]
    };
    let acc = vec3(-0.02, 0.02);
    let gyro = vec3(-0.01, 0.01);
    let mag = vec3(-0.5, 0.5);
    let sun = vec3(0.0, 1.0);

    SensorReadings {
        panel_voltage: Some(panel_voltage),
        battery_voltage: Some(rng.gen_range(7.0..8.4)),
        panel_current: Some(panel_current),
        battery_current: Some(rng.gen_range(-0.8..0.4)),
        mppt_power: Some(panel_voltage * panel_current),
        battery_soc: Some(rng.gen_range(60.0..95.0)),
        bus_current: Some(rng.gen_range(0.1..0.6)),
        board_temp: None,
        mppt_duty: Some(rng.gen_range(0.55..0.75)),
        acc,
        gyro,
        mag,
        sun,
        temp: Some(board_temp),
        press: Some(1000.0 + rng.gen_range(-5.0_f64..5.0)),
    }
}
