//! Fixtures shared by the end-to-end tests.
use std::sync::Arc;

use daqctl_client::Client;
use daqctl_protocol::{ConfigNode, Keyword, ScalarValue};
use daqctl_server::{
    live::{Crate, CrateArray, Module},
    server::{Builder, ServerHandle},
    sim::{SimulatedGoc, SimulatedModule},
};

/// Crate "Main" with a MADC-32, a V775 with one submodule and a GOC with two links.
///
/// Only the gate width of the MADC-32 differs from its default.
pub fn main_crate() -> Crate {
    let madc = Module::new(Keyword::MESYTEC_MADC32, SimulatedModule::mesytec_madc32())
        .with_config(
            ConfigNode::block(Keyword::MESYTEC_MADC32)
                .with_child(ConfigNode::param(Keyword::ADDRESS).with_scalar(
                    ScalarValue::Int32 {
                        value: 0x0010_0000,
                        unit: String::new(),
                    },
                ))
                .with_child(
                    ConfigNode::param(Keyword::GATE_WIDTH)
                        .with_scalar(ScalarValue::Double {
                            value: 250.0,
                            unit: "ns".to_string(),
                        })
                        .set(),
                ),
        );
    let v775 = Module::new(
        Keyword::CAEN_V775,
        SimulatedModule::caen_v775().with_custom_register("geo", 5),
    )
    .with_submodule(Module::new(
        Keyword::CAEN_V775,
        SimulatedModule::caen_v775(),
    ));
    Crate::new("Main")
        .with_module(madc)
        .with_module(v775)
        .with_tag("Default", vec![0, 1])
        .with_tag("Tdc", vec![1])
        .with_goc(SimulatedGoc::new(2))
}

/// A running server with [`main_crate`] on a free local port, and a client for it.
pub fn start() -> (Arc<CrateArray>, ServerHandle, Client) {
    let _ = env_logger::builder().is_test(true).try_init();
    let crates = Arc::new(CrateArray::new(vec![main_crate()]));
    let handle = Builder::new()
        .bind_addr("127.0.0.1:0".parse().expect("valid address"))
        .build(crates.clone())
        .spawn()
        .expect("server binds to a free port");
    let client = Client::new(handle.local_addr()).expect("local address resolves");
    (crates, handle, client)
}
