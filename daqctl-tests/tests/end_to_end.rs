use daqctl_client::{Builder, ClientError};
use daqctl_protocol::{AccessEntry, BitWidth, GocAddress, Keyword, ScalarValue, Target};
use daqctl_server::server::ServerState;
use daqctl_tests::start;
use std::time::Duration;

#[test]
fn online_check() {
    let (_crates, handle, client) = start();
    assert!(client.is_online());
    assert_eq!(handle.state(), ServerState::Listening);
}

#[test]
fn crate_array() {
    let (_crates, _handle, client) = start();
    let crates = client.crate_array().unwrap();
    assert_eq!(crates.len(), 1);
    assert_eq!(crates[0].name, "Main");
    assert_eq!(crates[0].modules[0].module_type, Keyword::MESYTEC_MADC32);
    assert_eq!(crates[0].modules[1].submodules, vec![Keyword::CAEN_V775]);
}

#[test]
fn crate_info_follows_counters() {
    let (crates, _handle, client) = start();
    let crate_ = &crates.crates()[0];
    crate_.counters().set_running(true);
    crate_.counters().add_events(1234);
    crate_.counters().set_deadtime_release_us(20);
    crate_.tags()[1].record_event();
    crate_.modules()[1].set_event_counter(99);

    let info = client.crate_info(0).unwrap();
    assert_eq!(info.name, "Main");
    assert!(info.running);
    assert_eq!(info.event_count, 1234);
    assert_eq!(info.deadtime_release_us, 20);
    assert_eq!(info.tags[0].name, "Default");
    assert_eq!(info.tags[1].event_count, 1);
    assert_eq!(info.modules[1].event_counter, 99);
}

#[test]
fn config_dump_keeps_touched_path() {
    let (_crates, _handle, client) = start();
    let dump = client.config_dump(Target::crate_at(0)).unwrap();
    assert_eq!(dump.len(), 1);
    let root = &dump[0];
    assert_eq!(root.name, Keyword::CRATE);
    assert_eq!(root.scalars[0].value, ScalarValue::String("Main".to_string()));
    assert_eq!(root.children.len(), 1);
    let madc = &root.children[0];
    assert_eq!(madc.name, Keyword::MESYTEC_MADC32);
    assert!(madc.child(Keyword::ADDRESS).is_none());
    assert!(madc.child(Keyword::GATE_WIDTH).is_some_and(|n| n.touched));
    assert_eq!(root.node_count(), 3);
}

#[test]
fn config_of_module_and_submodule() {
    let (_crates, _handle, client) = start();
    let full = client.config(Target::process()).unwrap();
    assert_eq!(full[0].node_count(), 6);

    let madc = client.config(Target::module_at(0, 0)).unwrap();
    assert_eq!(madc[0].children.len(), 2);

    let via_tag = client.config(Target::crate_at(0).tag(1).module(0)).unwrap();
    assert_eq!(via_tag[0].name, Keyword::CAEN_V775);
    assert_eq!(via_tag[0].children.len(), 1);

    let untouched = client
        .config_dump(Target::module_at(0, 1).submodule(0))
        .unwrap();
    assert!(untouched.is_empty());
}

#[test]
fn register_array_of_known_module() {
    let (_crates, _handle, client) = start();
    let registers = client.register_array(Target::module_at(0, 0)).unwrap();
    assert_eq!(registers.module_type, Keyword::MESYTEC_MADC32);
    assert!(!registers.registers.is_empty());
    assert_eq!(registers.get("firmware_revision"), Some(0x0210));
    assert_eq!(registers.get("soft_reset"), Some(0));

    let v775 = client.register_array(Target::module_at(0, 1)).unwrap();
    assert_eq!(v775.custom.len(), 1);
    assert_eq!(v775.custom[0].value, 5);
}

#[test]
fn module_access_write_then_read() {
    let (_crates, _handle, client) = start();
    let mut entries = [
        AccessEntry::write(0x6004, BitWidth::W16, 100),
        AccessEntry::read(0x6004, BitWidth::W16),
    ];
    client
        .module_access(Target::module_at(0, 0), &mut entries)
        .unwrap();
    assert_eq!(entries[1].value, 100);

    let registers = client.register_array(Target::module_at(0, 0)).unwrap();
    assert_eq!(registers.get("module_id"), Some(100));
}

#[test]
fn module_access_to_submodule() {
    let (_crates, _handle, client) = start();
    let target = Target::module_at(0, 1).submodule(0);
    let mut entries = [
        AccessEntry::write(0x1080, BitWidth::W16, 0x12),
        AccessEntry::read(0x1080, BitWidth::W16),
        AccessEntry::read(0x1000, BitWidth::W16),
    ];
    client.module_access(target, &mut entries).unwrap();
    assert_eq!(entries[1].value, 0x12);
    assert_eq!(entries[2].value, 0x0905);

    let parent = client.register_array(Target::module_at(0, 1)).unwrap();
    assert_eq!(parent.get("threshold_0"), Some(0));
}

#[test]
fn goc_write_then_read() {
    let (_crates, _handle, client) = start();
    let address = GocAddress {
        crate_i: 0,
        sfp: 1,
        card: 2,
        offset: 0x200,
    };
    // A request carries at most 255 records, so write in two halves.
    let values: Vec<u32> = (0..400).map(|i| i * 3).collect();
    assert_eq!(client.goc_write(address, &values[..200]).unwrap(), 200);
    let second_half = GocAddress {
        offset: 0x200 + 200 * 4,
        ..address
    };
    assert_eq!(client.goc_write(second_half, &values[200..]).unwrap(), 200);
    assert_eq!(client.goc_read(address, 400).unwrap(), values);
    let shifted = GocAddress {
        offset: 0x204,
        ..address
    };
    assert_eq!(client.goc_read(shifted, 1).unwrap(), vec![3]);
}

#[test]
fn read_only_commands_are_idempotent() {
    let (_crates, _handle, client) = start();
    assert_eq!(client.crate_info(0).unwrap(), client.crate_info(0).unwrap());
    assert_eq!(
        client.config(Target::process()).unwrap(),
        client.config(Target::process()).unwrap()
    );
    assert_eq!(
        client.register_array(Target::module_at(0, 1)).unwrap(),
        client.register_array(Target::module_at(0, 1)).unwrap()
    );
    assert_eq!(
        client.config_dump(Target::crate_at(0)).unwrap(),
        client.config_dump(Target::crate_at(0)).unwrap()
    );

    let address = GocAddress {
        crate_i: 0,
        sfp: 0,
        card: 1,
        offset: 0,
    };
    assert_eq!(
        client.goc_read(address, 16).unwrap(),
        client.goc_read(address, 16).unwrap()
    );

    let read = |client: &daqctl_client::Client| {
        let mut entries = [
            AccessEntry::read(0x600E, BitWidth::W16),
            AccessEntry::read(0x6010, BitWidth::W16),
        ];
        client
            .module_access(Target::module_at(0, 0), &mut entries)
            .unwrap();
        entries
    };
    assert_eq!(read(&client), read(&client));
}

#[test]
fn unanswerable_requests_yield_no_data() {
    let (_crates, _handle, client) = start();
    assert!(matches!(client.crate_info(3), Err(ClientError::NoData)));
    assert!(matches!(
        client.register_array(Target::module_at(0, 9)),
        Err(ClientError::NoData)
    ));
    assert!(matches!(
        client.config(Target::crate_at(0).tag(0)),
        Err(ClientError::NoData)
    ));
    let no_link = GocAddress {
        crate_i: 0,
        sfp: 7,
        card: 0,
        offset: 0,
    };
    assert!(matches!(client.goc_read(no_link, 1), Err(ClientError::NoData)));
    let mut unaligned = [AccessEntry::read(0x6005, BitWidth::W16)];
    assert!(matches!(
        client.module_access(Target::module_at(0, 0), &mut unaligned),
        Err(ClientError::NoData)
    ));
    assert!(client.is_online());
}

#[test]
fn shutdown_stops_answering() {
    let (_crates, handle, _client) = start();
    let addr = handle.local_addr();
    handle.shutdown();
    let client_after = Builder::new()
        .online_timeout(Duration::from_millis(100))
        .build(addr)
        .unwrap();
    assert!(!client_after.is_online());
    assert!(matches!(
        Builder::new()
            .timeout(Duration::from_millis(100))
            .build(addr)
            .unwrap()
            .crate_array(),
        Err(ClientError::Timeout) | Err(ClientError::Io(_))
    ));
}
