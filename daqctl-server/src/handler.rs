//! Turns decoded requests into response chains.
use daqctl_protocol::{
    Datagram, DatagramChain, MAGIC_VERSION, Request, Wire, chain::MAX_CHAIN_LEN,
};

use crate::{HandlerError, live::CrateArray};

/// Packs the answer to `request` into `chain`.
///
/// On error the chain may hold a partial answer and must be discarded.
pub fn respond(
    crates: &CrateArray,
    request: Request,
    chain: &mut DatagramChain,
) -> Result<(), HandlerError> {
    match request {
        Request::OnlineCheck => MAGIC_VERSION.pack(chain),
        Request::CrateArray => crates.topology().pack(chain),
        Request::CrateInfo { crate_i } => crates.get(crate_i)?.info().pack(chain),
        Request::RegisterList(target) => crates.module(&target)?.register_array()?.pack(chain),
        Request::Config(target) => crates.config_trees(&target)?.pack(chain),
        Request::ConfigDump(target) => crates.config_dump(&target)?.pack(chain),
        Request::GocRead { address, count } => crates
            .get(address.crate_i)?
            .goc_read(&address, count)?
            .pack(chain),
        Request::GocWrite { address, values } => crates
            .get(address.crate_i)?
            .goc_write(&address, &values)?
            .pack(chain),
        Request::ModuleAccess {
            target,
            mut entries,
        } => {
            let module = crates.module(&target)?;
            module.execute(&mut entries)?;
            for entry in &entries {
                log::debug!("{}: {}", target, entry);
            }
            entries.pack(chain);
        }
    }
    Ok(())
}

/// Answers `request` with at most `limit` datagrams.
///
/// Failures are logged and answered with the single "no data" datagram.
pub fn answer(crates: &CrateArray, request: Request, limit: usize) -> Vec<Datagram> {
    let command = request.command();
    let mut chain = DatagramChain::with_limit(limit);
    let result = respond(crates, request, &mut chain)
        .and_then(|_| chain.finish().map_err(HandlerError::from));
    match result {
        Ok(datagrams) => datagrams,
        Err(error) => {
            log::warn!("Cannot answer {} request: {}", command, error);
            vec![Datagram::new(0)]
        }
    }
}

/// Answers with the chain limit of the protocol.
pub fn answer_unlimited(crates: &CrateArray, request: Request) -> Vec<Datagram> {
    answer(crates, request, MAX_CHAIN_LEN)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        live::{Crate, Module},
        sim::{SimulatedGoc, SimulatedModule},
    };
    use daqctl_protocol::{
        AccessEntry, BitWidth, ConfigNode, CrateInfo, CrateTopology, GocAddress, Keyword,
        Reassembler, RegisterArray, ScalarValue, Target,
    };

    fn crates() -> CrateArray {
        let mut crate_ = Crate::new("Main")
            .with_tag("Default", vec![0])
            .with_goc(SimulatedGoc::new(1));
        for _ in 0..3 {
            crate_ = crate_.with_module(Module::new(
                Keyword::MESYTEC_MADC32,
                SimulatedModule::mesytec_madc32(),
            ));
        }
        CrateArray::new(vec![crate_])
    }

    fn decode<T: Wire>(datagrams: Vec<Datagram>) -> T {
        let mut reassembler = Reassembler::new();
        for datagram in datagrams {
            reassembler.insert(datagram);
        }
        reassembler.decode().unwrap()
    }

    fn is_no_data(datagrams: &[Datagram]) -> bool {
        datagrams.len() == 1 && datagrams[0].is_empty()
    }

    #[test]
    fn online_check() {
        let crates = crates();
        let magic: u32 = decode(answer_unlimited(&crates, Request::OnlineCheck));
        assert_eq!(magic, MAGIC_VERSION);
    }

    #[test]
    fn crate_array_and_info() {
        let crates = crates();
        let topology: Vec<CrateTopology> = decode(answer_unlimited(&crates, Request::CrateArray));
        assert_eq!(topology.len(), 1);
        assert_eq!(topology[0].name, "Main");
        assert_eq!(topology[0].modules.len(), 3);

        let info: CrateInfo =
            decode(answer_unlimited(&crates, Request::CrateInfo { crate_i: 0 }));
        assert_eq!(info.name, "Main");
        assert_eq!(info.tags[0].name, "Default");

        assert!(is_no_data(&answer_unlimited(
            &crates,
            Request::CrateInfo { crate_i: 4 }
        )));
    }

    #[test]
    fn register_list() {
        let crates = crates();
        let registers: RegisterArray = decode(answer_unlimited(
            &crates,
            Request::RegisterList(Target::module_at(0, 1)),
        ));
        assert_eq!(registers.module_type, Keyword::MESYTEC_MADC32);
        assert!(!registers.registers.is_empty());
        assert!(is_no_data(&answer_unlimited(
            &crates,
            Request::RegisterList(Target::crate_at(0))
        )));
    }

    #[test]
    fn config_dump_of_untouched_crate_is_empty() {
        let crates = crates();
        let trees: Vec<ConfigNode> = decode(answer_unlimited(
            &crates,
            Request::Config(Target::crate_at(0)),
        ));
        assert_eq!(trees[0].children.len(), 3);
        assert_eq!(
            trees[0].scalars[0].value,
            ScalarValue::String("Main".to_string())
        );

        let dump: Vec<ConfigNode> = decode(answer_unlimited(
            &crates,
            Request::ConfigDump(Target::process()),
        ));
        assert!(dump.is_empty());
    }

    #[test]
    fn module_access_write_then_read() {
        let crates = crates();
        let request = Request::ModuleAccess {
            target: Target::module_at(0, 2),
            entries: vec![
                AccessEntry::write(0x6004, BitWidth::W16, 100),
                AccessEntry::read(0x6004, BitWidth::W16),
            ],
        };
        let entries: Vec<AccessEntry> = decode(answer_unlimited(&crates, request));
        assert_eq!(entries[1].value, 100);

        let unaligned = Request::ModuleAccess {
            target: Target::module_at(0, 2),
            entries: vec![AccessEntry::read(0x6005, BitWidth::W16)],
        };
        assert!(is_no_data(&answer_unlimited(&crates, unaligned)));
    }

    #[test]
    fn goc_write_then_read() {
        let crates = crates();
        let address = GocAddress {
            crate_i: 0,
            sfp: 0,
            card: 3,
            offset: 0x20,
        };
        let written: u32 = decode(answer_unlimited(
            &crates,
            Request::GocWrite {
                address,
                values: vec![0xdead, 0xbeef],
            },
        ));
        assert_eq!(written, 2);
        let values: Vec<u32> = decode(answer_unlimited(
            &crates,
            Request::GocRead { address, count: 2 },
        ));
        assert_eq!(values, vec![0xdead, 0xbeef]);
    }

    #[test]
    fn answer_over_limit_is_no_data() {
        let crates = crates();
        let request = Request::GocRead {
            address: GocAddress {
                crate_i: 0,
                sfp: 0,
                card: 0,
                offset: 0,
            },
            count: 1000,
        };
        assert!(answer_unlimited(&crates, request.clone()).len() > 1);
        assert!(is_no_data(&answer(&crates, request, 1)));
    }
}
