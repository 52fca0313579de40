//! Static register tables of the supported module types.
use daqctl_protocol::{
    Access::{Read, ReadWrite, Write},
    BitWidth::W16,
    Keyword, RegisterDescriptor,
};

pub const MESYTEC_MADC32: &[RegisterDescriptor] = &[
    RegisterDescriptor::new("module_id", 0x6004, W16, ReadWrite),
    RegisterDescriptor::new("soft_reset", 0x6008, W16, Write),
    RegisterDescriptor::new("firmware_revision", 0x600E, W16, Read),
    RegisterDescriptor::new("irq_level", 0x6010, W16, ReadWrite),
    RegisterDescriptor::new("irq_vector", 0x6012, W16, ReadWrite),
    RegisterDescriptor::new("buffer_data_length", 0x6030, W16, Read),
    RegisterDescriptor::new("data_len_format", 0x6032, W16, ReadWrite),
    RegisterDescriptor::new("multi_event", 0x6036, W16, ReadWrite),
    RegisterDescriptor::new("marking_type", 0x6038, W16, ReadWrite),
    RegisterDescriptor::new("bank_operation", 0x6040, W16, ReadWrite),
    RegisterDescriptor::new("adc_resolution", 0x6042, W16, ReadWrite),
    RegisterDescriptor::new("hold_delay_0", 0x6050, W16, ReadWrite),
    RegisterDescriptor::new("hold_width_0", 0x6054, W16, ReadWrite),
    RegisterDescriptor::new("use_gg", 0x6058, W16, ReadWrite),
    RegisterDescriptor::new("input_range", 0x6060, W16, ReadWrite),
    RegisterDescriptor::new("start_acq", 0x603A, W16, ReadWrite),
    RegisterDescriptor::new("event_counter_low", 0x6092, W16, Read),
    RegisterDescriptor::new("event_counter_high", 0x6094, W16, Read),
];

pub const CAEN_V775: &[RegisterDescriptor] = &[
    RegisterDescriptor::new("firmware_revision", 0x1000, W16, Read),
    RegisterDescriptor::new("geo_address", 0x1002, W16, ReadWrite),
    RegisterDescriptor::new("bit_set_1", 0x1006, W16, ReadWrite),
    RegisterDescriptor::new("bit_clear_1", 0x1008, W16, ReadWrite),
    RegisterDescriptor::new("status_register_1", 0x100E, W16, Read),
    RegisterDescriptor::new("control_register_1", 0x1010, W16, ReadWrite),
    RegisterDescriptor::new("event_trigger_register", 0x1020, W16, ReadWrite),
    RegisterDescriptor::new("status_register_2", 0x1022, W16, Read),
    RegisterDescriptor::new("event_counter_low", 0x1024, W16, Read),
    RegisterDescriptor::new("event_counter_high", 0x1026, W16, Read),
    RegisterDescriptor::new("bit_set_2", 0x1032, W16, ReadWrite),
    RegisterDescriptor::new("bit_clear_2", 0x1034, W16, Write),
    RegisterDescriptor::new("event_counter_reset", 0x1040, W16, Write),
    RegisterDescriptor::new("full_scale_range", 0x1060, W16, ReadWrite),
    RegisterDescriptor::new("threshold_0", 0x1080, W16, ReadWrite),
    RegisterDescriptor::new("threshold_1", 0x1082, W16, ReadWrite),
];

/// The register table of a module type, if one is known.
pub fn table_for(module_type: Keyword) -> Option<&'static [RegisterDescriptor]> {
    match module_type {
        Keyword::MESYTEC_MADC32 => Some(MESYTEC_MADC32),
        Keyword::CAEN_V775 => Some(CAEN_V775),
        _ => None,
    }
}
