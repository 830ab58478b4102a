use crate::analysis::UNKNOWN_FRAME_SIZE;
use crate::binary::InstrAddr;
use crate::buffer::{get_patch_records, Options};
use crate::loader::json;
use crate::models::FunctionSummaryLibrary;


const SUMMARIES: &str = r#"
[
    {"name": "strcpy",
     "library": "libc",
     "parameters": [
        {"name": "dest", "type": "char *"},
        {"name": "src", "type": "char *", "preconditions": ["deref-read-nt"]}
     ],
     "preconditions": [
        {"tag": "deref-write", "type": "char",
         "destination": {"tag": "ci", "text": "dest"},
         "length": {"tag": "null-terminator-pos", "args": [{"tag": "ci", "text": "src"}]}}
     ]},
    {"name": "sprintf",
     "library": "libc",
     "parameters": [
        {"name": "str", "type": "char *"},
        {"name": "format", "type": "char *", "preconditions": ["deref-read-nt"]}
     ],
     "preconditions": [
        {"tag": "deref-write", "type": "char",
         "destination": {"tag": "ci", "text": "str"},
         "length": "runtime-value"}
     ]}
]
"#;

fn summaries() -> FunctionSummaryLibrary {
    json::load_summaries(SUMMARIES).unwrap()
}

/// A function with a buffer at -40, below the saved return address, which is
/// the destination of an `sprintf` with a format that is not a literal.
const SPRINTF_0: &str = r#"
{"arch": "mips",
 "functions": [
    {"address": "0x400a00", "name": "format_name",
     "blocks": [
        {"address": "0x400a00",
         "instructions": [
            {"address": "0x400a00", "mnemonic": "addiu", "spoffset": 0},
            {"address": "0x400a04", "mnemonic": "sw", "spoffset": -48,
             "accesses": [{"address": {"stack": -4}, "size": 4, "spill": "ra"}]},
            {"address": "0x400a08", "mnemonic": "lw", "spoffset": -48,
             "operands": ["t9", "-0x7fd0(gp)"], "load": true},
            {"address": "0x400a0c", "mnemonic": "jalr", "spoffset": -48,
             "call": {"target": "sprintf",
                      "arguments": [{"stack": -40}, {"arg": "a1"}, {"arg": "a2"}]}},
            {"address": "0x400a10", "mnemonic": "lw", "spoffset": -48,
             "accesses": [{"address": {"stack": -4}, "size": 4, "restore": "ra"}]},
            {"address": "0x400a14", "mnemonic": "jr", "spoffset": 0}
         ]}
     ]}
 ]}
"#;

#[test]
fn sprintf_into_stack_buffer() {
    let binary = json::load_binary(SPRINTF_0, summaries()).unwrap();
    let records = get_patch_records(&binary, &Options::new()).unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.faddr(), &InstrAddr::new("0x400a00"));
    assert_eq!(record.iaddr(), &InstrAddr::new("0x400a0c"));
    assert_eq!(record.callee(), "sprintf");
    assert_eq!(record.formatstring(), None);
    assert_eq!(record.fname().unwrap(), "format_name");
    assert_eq!(record.spare(), Some(&InstrAddr::new("0x400a08")));
    assert_eq!(record.buffer().offset(), -40);
    assert_eq!(record.buffer().size(), Some(36));

    let value = record.to_json();
    assert_eq!(value["buffersize"], 36);
    assert_eq!(value["spare"], "0x400a08");
    assert!(value.get("fmtstring").is_none());
}

#[test]
fn sprintf_call_site_is_a_patch_candidate() {
    let binary = json::load_binary(SPRINTF_0, summaries()).unwrap();
    let callsites = binary.library_callsites().unwrap();

    let callsite = callsites
        .callsite(&InstrAddr::new("0x400a00"), &InstrAddr::new("0x400a0c"))
        .unwrap();
    assert_eq!(callsite.known_input_length(), None);
    // the write, and the read of the format declared on the parameter
    assert_eq!(callsite.preconditions().len(), 2);
    assert_eq!(callsite.derefwrites().len(), 1);
    assert_eq!(callsite.patch_candidates().len(), 1);
    assert_eq!(callsite.patch_candidates()[0].lentype(), "runtime-value");
}

#[test]
fn spare_search_can_be_disabled() {
    let binary = json::load_binary(SPRINTF_0, summaries()).unwrap();
    let mut options = Options::new();
    options.set_find_spare(false);
    let records = get_patch_records(&binary, &options).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].spare(), None);
    assert!(records[0].to_json().get("spare").is_none());
}

#[test]
fn unselected_callees_are_skipped() {
    let binary = json::load_binary(SPRINTF_0, summaries()).unwrap();
    let options = Options::from_json(r#"{"callees": ["strcpy"]}"#).unwrap();
    assert!(get_patch_records(&binary, &options).unwrap().is_empty());
}

#[test]
fn stack_layout_of_loaded_function() {
    let binary = json::load_binary(SPRINTF_0, summaries()).unwrap();
    let function = binary.function(&InstrAddr::new("0x400a00")).unwrap();
    let stack_layout = function.stack_layout().unwrap();

    assert_eq!(stack_layout.size(), 48);
    assert_eq!(stack_layout.accesses().len(), 3);
    assert!(stack_layout.is_saved_register_slot(-4));
    assert_eq!(stack_layout.stackbuffer(-4).unwrap().size(), Some(4));
    assert!(stack_layout.stack_access(-40).unwrap().is_escaped());
}

const EXTREME_0: &str = r#"
{"arch": "mips",
 "functions": [
    {"address": "0x400c00", "name": "extreme",
     "blocks": [
        {"address": "0x400c00",
         "instructions": [
            {"address": "0x400c00", "mnemonic": "addiu", "spoffset": 0,
             "accesses": [{"address": {"stack": 0}, "size": 4, "mode": "r"}]},
            {"address": "0x400c04", "mnemonic": "sw", "spoffset": -9223372036854775808,
             "accesses": [{"address": {"stack": -9223372036854775808}, "size": 4, "mode": "w"}]},
            {"address": "0x400c08", "mnemonic": "jalr", "spoffset": -9223372036854775808,
             "call": {"target": "strcpy",
                      "arguments": [{"stack": -9223372036854775808}, {"arg": "a0"}]}}
         ]}
     ]}
 ]}
"#;

#[test]
fn extreme_stack_offsets() {
    let binary = json::load_binary(EXTREME_0, summaries()).unwrap();
    let function = binary.function(&InstrAddr::new("0x400c00")).unwrap();
    let stack_layout = function.stack_layout().unwrap();

    assert_eq!(stack_layout.size(), UNKNOWN_FRAME_SIZE);
    let access = stack_layout.stack_access(i64::MIN).unwrap();
    assert_eq!(access.writes().len(), 1);
    assert!(access.is_escaped());
    assert_eq!(stack_layout.stackbuffer(i64::MIN), None);

    assert!(get_patch_records(&binary, &Options::new()).unwrap().is_empty());
}
