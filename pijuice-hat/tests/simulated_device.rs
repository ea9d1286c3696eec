//! End-to-end behaviour against the simulated HAT

use std::sync::Arc;

use pijuice_hat::{
    Alarm, AlarmDay, AlarmHour, AlarmMinute, ErrorKind, Hour, LogConfigFlag, PiJuice,
    PiJuiceHandle, RunPinConfig, SettingKey, SettingsRegistry, WakeOnCharge,
};
use pijuice_transport::{cmd, FlowControlTransport, RetryPolicy, SimulatedTransport};

fn device() -> (Arc<SimulatedTransport>, PiJuice) {
    let sim = Arc::new(SimulatedTransport::new());
    let flow = FlowControlTransport::with_policy(sim.clone(), RetryPolicy::immediate());
    (sim, PiJuice::new(Arc::new(flow)))
}

#[test]
fn transient_bus_errors_are_retried() {
    let (sim, pj) = device();
    sim.fail_reads(2);
    assert_eq!(pj.status().get_charge_level().unwrap(), 82);
    assert_eq!(sim.read_count(), 3);
}

#[test]
fn exhausted_retries_report_communication_error() {
    let (sim, pj) = device();
    sim.fail_reads(u32::MAX);
    let err = pj.status().get_charge_level().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CommunicationError);
}

#[test]
fn persistent_corruption_reports_data_corrupted() {
    let (sim, pj) = device();
    sim.set_checksum_corruption(true);
    let err = pj.status().get_battery_voltage().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataCorrupted);

    sim.set_checksum_corruption(false);
    assert_eq!(pj.status().get_battery_voltage().unwrap(), 4020);
}

#[test]
fn dropped_msb_is_recovered() {
    let (sim, pj) = device();
    sim.set_recoverable_checksum(true);
    let stored = pj.power().get_wakeup_on_charge().unwrap();
    assert_eq!(stored.value, WakeOnCharge::Level(24));
    assert!(stored.non_volatile);
}

#[test]
fn corrupt_payload_with_valid_checksum_is_returned_as_read() {
    let (sim, pj) = device();
    sim.corrupt_next_read();
    assert_eq!(pj.status().get_charge_level().unwrap(), !82u8);
    assert_eq!(pj.status().get_charge_level().unwrap(), 82);
}

#[test]
fn charge_level_follows_device() {
    let (sim, pj) = device();
    sim.set_charge_level(17);
    assert_eq!(pj.status().get_charge_level().unwrap(), 17);

    sim.set_power_inputs(false, false);
    assert!(!pj.status().get_status().unwrap().is_powered());
    sim.set_power_inputs(true, false);
    assert!(pj.status().get_status().unwrap().is_powered());
}

#[test]
fn power_settings_survive_readback() {
    let (sim, pj) = device();
    let power = pj.power();
    power.set_wakeup_on_charge(WakeOnCharge::Level(40), true).unwrap();
    let stored = power.get_wakeup_on_charge().unwrap();
    assert_eq!(stored.value, WakeOnCharge::Level(40));
    assert!(stored.non_volatile);

    sim.freeze_register(cmd::WATCHDOG_ACTIVATION);
    assert_eq!(
        power.set_watchdog(10, false).unwrap_err().kind(),
        ErrorKind::WriteFailed
    );
}

#[test]
fn alarm_every_weekday_morning() {
    let (_sim, pj) = device();
    let alarm = Alarm {
        second: Some(0),
        minute: AlarmMinute::At(30),
        hour: AlarmHour::At(Hour::H24(7)),
        day: AlarmDay::parse_weekdays("2;3;4;5;6").unwrap(),
    };
    let rtc = pj.rtc();
    rtc.set_alarm(&alarm).unwrap();
    assert_eq!(rtc.get_alarm().unwrap(), alarm);

    rtc.set_wakeup_enabled(true).unwrap();
    assert!(rtc.get_control_status().unwrap().wakeup_enabled);
}

#[test]
fn clock_advances_between_reads() {
    let (sim, pj) = device();
    let before = pj.rtc().get_time().unwrap();
    sim.tick(90);
    let after = pj.rtc().get_time().unwrap();
    let elapsed = after.to_naive().unwrap() - before.to_naive().unwrap();
    assert_eq!(elapsed.num_seconds(), 90);
}

#[test]
fn registry_round_trip() {
    let (_sim, pj) = device();
    SettingsRegistry::apply(&pj, SettingKey::RunPin, "INSTALLED").unwrap();
    assert_eq!(
        pj.config().get_run_pin_config().unwrap(),
        RunPinConfig::Installed
    );
    let run_pin = SettingsRegistry::describe_one(&pj, SettingKey::RunPin).unwrap();
    assert_eq!(run_pin.current, "INSTALLED");

    SettingsRegistry::apply(&pj, SettingKey::DiagLogConfig, "MCU_RESET").unwrap();
    assert_eq!(
        pj.diag_log().get_config().unwrap(),
        vec![LogConfigFlag::McuReset]
    );
}

#[test]
fn diagnostic_log_reads_whole_ring() {
    let (_sim, pj) = device();
    let entries = pj.diag_log().read_entries().unwrap();
    assert_eq!(entries.len(), 6);
    for entry in &entries {
        assert!(entry.timestamp.validate().is_ok());
    }
    let alarm = entries
        .iter()
        .find(|e| e.event.name() == "ALARM_EVT")
        .unwrap();
    assert!(alarm.to_string().contains("temp=194°C bat=41268mV"));
}

#[test]
fn reset_to_default_restores_settings() {
    let (sim, pj) = device();
    let original = sim.register(cmd::RUN_PIN_CONFIG);
    pj.config().set_run_pin_config(RunPinConfig::Installed).unwrap();
    pj.config().reset_to_default().unwrap();
    assert_eq!(sim.register(cmd::RUN_PIN_CONFIG), original);
}

#[tokio::test]
async fn worker_serves_concurrent_callers() {
    let (sim, pj) = device();
    let handle = PiJuiceHandle::spawn(pj).unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.call(|pj| pj.status().get_charge_level()).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 82);
    }
    assert_eq!(sim.read_count(), 8);
}
