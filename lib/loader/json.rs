//! JSON front end for facts and function summaries.
//!
//! Facts are read from a document of the form
//!
//! ```text
//! { "arch": "mips",
//!   "functions": [
//!     { "address": "0x400a00", "name": "main",
//!       "blocks": [
//!         { "address": "0x400a00",
//!           "instructions": [
//!             { "address": "0x400a40", "mnemonic": "jalr", "spoffset": -48,
//!               "accesses": [{"address": {"stack": -4}, "mode": "w", "size": 4, "spill": "ra"}],
//!               "call": {"target": "strcpy", "arguments": [{"stack": -40}, {"reg": "a1"}]} } ] } ] } ] }
//! ```
//!
//! Symbolic expressions use a compact notation: a number is an integer
//! constant, `{"stack": n}` is the stack address `n` bytes from the stack
//! pointer at entry, `{"reg": r}` is the current value of a register and
//! `{"arg": r}` the value it held at entry. `{"string": s, "address": a}`
//! refers to a string literal, `{"global": a}` to a global address, `{"gv": a}`
//! to a global variable, `{"heap": site, "offset": n}` to a heap address and
//! `{"return": f}` to the return value of a call to `f`. Compound expressions
//! are written `{"op": "plus", "args": [x, y]}`.

use crate::analysis::StackPointerOffset;
use crate::architecture::{self, Architecture};
use crate::binary::{
    AccessMode, Binary, Block, Call, CallTarget, Function, InstrAddr, Instruction, MemoryAccess,
};
use crate::invariants::{
    Interval, NonRelationalFact, NonRelationalValue, Symbol, XOperator, XVariable, Xpr,
};
use crate::loader::Loader;
use crate::models::{
    FunctionParameter, FunctionPrecondition, FunctionSummary, FunctionSummaryLibrary,
};
use crate::Error;
use log::{debug, warn};
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Facts for a binary, read from JSON.
#[derive(Clone, Debug)]
pub struct Json {
    architecture: String,
    root: Value,
}

impl Json {
    pub fn from_file(filename: &Path) -> Result<Json, Error> {
        let mut file = File::open(filename)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Json::parse(&buf)
    }

    pub fn parse(text: &str) -> Result<Json, Error> {
        let root: Value = serde_json::from_str(text)?;

        let architecture = match root["arch"] {
            Value::String(ref architecture) => architecture.to_string(),
            _ => return Err("architecture missing".into()),
        };

        if !root["functions"].is_array() {
            return Err("functions missing".into());
        }

        Ok(Json { architecture, root })
    }
}

impl Loader for Json {
    fn architecture(&self) -> Result<Box<dyn Architecture>, Error> {
        architecture::from_name(&self.architecture)
    }

    fn functions(&self) -> Result<Vec<Function>, Error> {
        let architecture = self.architecture()?;
        let mut functions = Vec::new();
        if let Value::Array(ref values) = self.root["functions"] {
            for value in values {
                functions.push(function(value, architecture.as_ref())?);
            }
        }
        Ok(functions)
    }
}

/// Load the facts of a binary calling the library functions in `summaries`.
pub fn load_binary(text: &str, summaries: FunctionSummaryLibrary) -> Result<Binary, Error> {
    Json::parse(text)?.binary(summaries)
}

/// Load function summaries, given either as a list or as the `summaries` of
/// an object.
pub fn load_summaries(text: &str) -> Result<FunctionSummaryLibrary, Error> {
    let root: Value = serde_json::from_str(text)?;
    let values = match root {
        Value::Array(ref values) => values,
        Value::Object(_) => match root["summaries"] {
            Value::Array(ref values) => values,
            _ => return Err("summaries missing".into()),
        },
        _ => return Err("summaries missing".into()),
    };

    let mut library = FunctionSummaryLibrary::new();
    for value in values {
        library.add_summary(summary(value)?);
    }
    debug!("loaded {} function summaries", library.len());
    Ok(library)
}

fn summary(value: &Value) -> Result<FunctionSummary, Error> {
    let name = match value["name"] {
        Value::String(ref name) => name.to_string(),
        _ => return Err("name missing for summary".into()),
    };

    let mut parameters = Vec::new();
    if let Value::Array(ref values) = value["parameters"] {
        for parameter in values {
            let parameter_name = match parameter["name"] {
                Value::String(ref name) => name.to_string(),
                _ => return Err(format!("parameter name missing in summary for {}", name).into()),
            };
            let type_ = parameter["type"].as_str().map(|type_| type_.to_string());
            let mut parameter_ = FunctionParameter::new(parameter_name, type_);
            if let Value::Array(ref tags) = parameter["preconditions"] {
                for tag in tags {
                    match tag.as_str() {
                        Some(tag) => parameter_ = parameter_.with_precondition(tag),
                        None => warn!("ignoring parameter precondition {} in {}", tag, name),
                    }
                }
            }
            parameters.push(parameter_);
        }
    }

    let mut preconditions = Vec::new();
    if let Value::Array(ref values) = value["preconditions"] {
        for precondition in values {
            preconditions.push(FunctionPrecondition::from_json(precondition)?);
        }
    }

    let summary = FunctionSummary::new(name, parameters, preconditions);
    Ok(match value["library"] {
        Value::String(ref library) => summary.with_library(library.as_str()),
        _ => summary,
    })
}

fn address(value: &Value) -> Result<InstrAddr, Error> {
    match *value {
        Value::String(ref address) => Ok(InstrAddr::new(address.as_str())),
        Value::Number(ref address) => match address.as_u64() {
            Some(address) => Ok(InstrAddr::from_u64(address)),
            None => Err(format!("address {} not u64", address).into()),
        },
        _ => Err("address missing".into()),
    }
}

fn i64_field(value: &Value, field: &str) -> Result<i64, Error> {
    value[field]
        .as_i64()
        .ok_or_else(|| format!("{} missing or not i64 in {}", field, value).into())
}

fn u64_field(value: &Value, field: &str) -> Result<u64, Error> {
    value[field]
        .as_u64()
        .ok_or_else(|| format!("{} missing or not u64 in {}", field, value).into())
}

fn str_field<'v>(value: &'v Value, field: &str) -> Result<&'v str, Error> {
    value[field]
        .as_str()
        .ok_or_else(|| format!("{} missing or not a string in {}", field, value).into())
}

/// Parse a symbolic expression.
pub fn xpr(value: &Value) -> Result<Xpr, Error> {
    if let Some(n) = value.as_i64() {
        return Ok(Xpr::int_constant(n));
    }
    let object = match value.as_object() {
        Some(object) => object,
        None => return Err(format!("malformed expression {}", value).into()),
    };

    if object.contains_key("int") {
        Ok(Xpr::int_constant(i64_field(value, "int")?))
    } else if object.contains_key("stack") {
        Ok(Xpr::stack_address(i64_field(value, "stack")?))
    } else if object.contains_key("reg") {
        Ok(Xpr::register(str_field(value, "reg")?))
    } else if object.contains_key("arg") {
        Ok(Xpr::initial_register_value(str_field(value, "arg")?))
    } else if object.contains_key("string") {
        Ok(Xpr::string_reference(
            u64_field(value, "address")?,
            str_field(value, "string")?,
        ))
    } else if object.contains_key("global") {
        Ok(Xpr::global_address(u64_field(value, "global")?))
    } else if object.contains_key("gv") {
        Ok(Xpr::variable(XVariable::GlobalVariable(u64_field(value, "gv")?)))
    } else if object.contains_key("heap") {
        Ok(Xpr::heap_address(
            str_field(value, "heap")?,
            value["offset"].as_i64().unwrap_or(0),
        ))
    } else if object.contains_key("return") {
        Ok(Xpr::variable(XVariable::ReturnValue(
            str_field(value, "return")?.to_string(),
        )))
    } else if object.contains_key("op") {
        let op: XOperator = serde_json::from_value(value["op"].clone())?;
        let mut operands = Vec::new();
        if let Value::Array(ref args) = value["args"] {
            for arg in args {
                operands.push(xpr(arg)?);
            }
        }
        Ok(Xpr::Compound { op, operands })
    } else {
        Err(format!("malformed expression {}", value).into())
    }
}

fn stackpointer_offset(value: &Value) -> Result<StackPointerOffset, Error> {
    if let Some(offset) = value.as_i64() {
        return Ok(StackPointerOffset::exact(offset));
    }
    if !value.is_object() {
        return Err(format!("malformed stack pointer offset {}", value).into());
    }
    let level = match value["level"].as_u64() {
        Some(level) => u32::try_from(level)
            .map_err(|_| format!("nesting level {} out of range in {}", level, value))?,
        None => 0,
    };
    let interval = Interval::from_options(value["lower"].as_i64(), value["upper"].as_i64());
    Ok(StackPointerOffset::new(level, interval))
}

fn invariant(value: &Value) -> Result<NonRelationalFact, Error> {
    let variable = str_field(value, "variable")?;
    let lower = value["lower"].as_i64();
    let upper = value["upper"].as_i64();
    let value_ = if value.get("expr").is_some() {
        NonRelationalValue::SymbolicExpr(xpr(&value["expr"])?)
    } else if let Some(base) = value["base"].as_str() {
        NonRelationalValue::BaseOffsetValue {
            base: Symbol::new(base),
            lower,
            upper,
            nullable: value["nullable"].as_bool().unwrap_or(false),
        }
    } else {
        NonRelationalValue::IntervalValue { lower, upper }
    };
    Ok(NonRelationalFact::new(variable, value_))
}

fn memory_access(value: &Value) -> Result<MemoryAccess, Error> {
    let address = xpr(&value["address"])?;
    let size = match value["size"].as_i64() {
        Some(size) => Some(
            i32::try_from(size)
                .map_err(|_| format!("access size {} out of range in {}", size, value))?,
        ),
        None => None,
    };
    if let Some(register) = value["spill"].as_str() {
        return Ok(MemoryAccess::register_spill(register, address, size));
    }
    if let Some(register) = value["restore"].as_str() {
        return Ok(MemoryAccess::register_restore(register, address, size));
    }
    let mode = match value["mode"].as_str() {
        Some("r") => AccessMode::READ,
        Some("w") => AccessMode::WRITE,
        Some("rw") => AccessMode::READ_WRITE,
        _ => return Err(format!("access mode missing in {}", value).into()),
    };
    Ok(MemoryAccess::new(address, mode, size))
}

fn call(value: &Value) -> Result<Call, Error> {
    let target = match value["target"] {
        Value::String(ref name) => CallTarget::stub(name.as_str()),
        Value::Object(_) => {
            if let Some(name) = value["target"]["stub"].as_str() {
                CallTarget::stub(name)
            } else if let Some(address) = value["target"]["app"].as_u64() {
                CallTarget::App {
                    address,
                    name: value["target"]["name"].as_str().map(|name| name.to_string()),
                }
            } else {
                CallTarget::Unknown
            }
        }
        _ => CallTarget::Unknown,
    };
    let mut arguments = Vec::new();
    if let Value::Array(ref values) = value["arguments"] {
        for argument in values {
            arguments.push(xpr(argument)?);
        }
    }
    Ok(Call::new(target, arguments))
}

fn instruction(value: &Value, architecture: &dyn Architecture) -> Result<Instruction, Error> {
    let address = address(&value["address"])?;
    let mnemonic = value["mnemonic"].as_str().unwrap_or("");

    let mut invariants = Vec::new();
    if let Value::Array(ref values) = value["invariants"] {
        for invariant_ in values {
            invariants.push(invariant(invariant_)?);
        }
    }

    // Without an explicit offset, derive it from an invariant on the stack
    // pointer.
    let stack_pointer = architecture.stack_pointer().trim_start_matches('$');
    let spo = match value.get("spoffset") {
        Some(spoffset) => stackpointer_offset(spoffset)?,
        None => invariants
            .iter()
            .filter(|fact| fact.variable().trim_start_matches('$') == stack_pointer)
            .find_map(|fact| StackPointerOffset::from_invariant(0, fact.value()))
            .unwrap_or_else(StackPointerOffset::unknown),
    };

    let mut instruction = Instruction::new(address, mnemonic, spo);
    if let Value::Array(ref operands) = value["operands"] {
        instruction = instruction.with_operands(
            operands
                .iter()
                .map(|operand| match operand.as_str() {
                    Some(operand) => operand.to_string(),
                    None => operand.to_string(),
                })
                .collect(),
        );
    }
    if let Value::Array(ref accesses) = value["accesses"] {
        for access in accesses {
            instruction = instruction.with_memory_access(memory_access(access)?);
        }
    }
    if value.get("call").is_some() {
        instruction = instruction.with_call(call(&value["call"])?);
    }
    for fact in invariants {
        instruction = instruction.with_invariant(fact);
    }
    instruction.set_load(value["load"].as_bool().unwrap_or(false));
    if let Some(annotation) = value["annotation"].as_str() {
        instruction.set_annotation(Some(annotation.to_string()));
    }
    Ok(instruction)
}

fn function(value: &Value, architecture: &dyn Architecture) -> Result<Function, Error> {
    let mut function = Function::new(address(&value["address"])?);
    function.set_name(value["name"].as_str().map(|name| name.to_string()));

    if let Value::Array(ref blocks) = value["blocks"] {
        for block_ in blocks {
            let mut block = Block::new(address(&block_["address"])?);
            if let Value::Array(ref instructions) = block_["instructions"] {
                for instruction_ in instructions {
                    block.add_instruction(instruction(instruction_, architecture)?);
                }
            }
            function.add_block(block);
        }
    } else {
        return Err(format!("blocks missing for function {}", function.address()).into());
    }

    Ok(function)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn expressions() {
        assert_eq!(xpr(&json!(12)).unwrap(), Xpr::int_constant(12));
        assert_eq!(xpr(&json!({"stack": -40})).unwrap(), Xpr::stack_address(-40));
        assert_eq!(xpr(&json!({"reg": "a1"})).unwrap(), Xpr::register("a1"));
        assert_eq!(
            xpr(&json!({"arg": "a0"})).unwrap(),
            Xpr::initial_register_value("a0")
        );
        assert_eq!(
            xpr(&json!({"string": "%s", "address": 4096})).unwrap(),
            Xpr::string_reference(4096, "%s")
        );
        assert!(xpr(&json!({"heap": "malloc"})).unwrap().is_heap_address());
        assert!(xpr(&json!({"return": "malloc"}))
            .unwrap()
            .is_function_return_value());
        assert_eq!(
            xpr(&json!({"op": "mult", "args": [{"reg": "a1"}, 4]})).unwrap(),
            Xpr::binary(XOperator::Mult, Xpr::register("a1"), Xpr::int_constant(4))
        );
        assert!(xpr(&json!("a1")).is_err());
        assert!(xpr(&json!({"op": "frobnicate", "args": []})).is_err());
    }

    #[test]
    fn offset_from_invariant() {
        let value = json!({
            "address": "0x400104",
            "mnemonic": "sw",
            "invariants": [
                {"variable": "v0", "lower": 0, "upper": 4},
                {"variable": "$sp", "base": "sp_in", "lower": -48, "upper": -48}
            ]
        });
        let parsed = instruction(&value, &architecture::Mips::new()).unwrap();
        assert_eq!(parsed.stackpointer_offset(), &StackPointerOffset::exact(-48));
        assert_eq!(parsed.invariants().len(), 2);

        let value = json!({"address": "0x400104", "mnemonic": "sw"});
        let parsed = instruction(&value, &architecture::Mips::new()).unwrap();
        assert!(!parsed.stackpointer_offset().is_closed());
    }

    #[test]
    fn accesses_and_calls() {
        let value = json!({
            "address": "0x400108",
            "mnemonic": "jalr",
            "spoffset": {"level": 1, "lower": -48},
            "accesses": [
                {"address": {"stack": -4}, "size": 4, "spill": "ra"},
                {"address": {"stack": -8}, "mode": "rw", "size": 4}
            ],
            "call": {"target": {"app": 4196352, "name": "helper"}, "arguments": [{"stack": -40}]}
        });
        let parsed = instruction(&value, &architecture::X86::new()).unwrap();
        assert_eq!(parsed.stackpointer_offset().nesting_level(), 1);
        assert!(!parsed.stackpointer_offset().is_upper_bounded());
        assert!(parsed.memory_accesses()[0].is_register_spill());
        assert!(parsed.memory_accesses()[1].is_read());
        assert!(parsed.memory_accesses()[1].is_write());
        assert_eq!(parsed.call_target_name(), Some("helper"));
        assert!(!parsed.call_target().unwrap().is_stub());
        assert!(parsed.touches_stack());

        let value = json!({"address": 16, "accesses": [{"address": {"stack": -8}}]});
        assert!(super::instruction(&value, &architecture::X86::new()).is_err());
    }

    #[test]
    fn summaries() {
        let text = r#"
        {"summaries": [
            {"name": "strncpy",
             "library": "libc",
             "parameters": [
                {"name": "dest", "type": "char *"},
                {"name": "src", "type": "char *", "preconditions": ["deref-read-nt"]},
                {"name": "n", "type": "size_t"}
             ],
             "preconditions": [
                {"tag": "deref-write", "type": "char",
                 "destination": {"tag": "ci", "text": "dest"},
                 "length": {"tag": "ci", "text": "n"}}
             ]}
        ]}"#;
        let library = load_summaries(text).unwrap();
        let summary = library.get_function_summary("strncpy").unwrap();
        assert_eq!(summary.library(), Some("libc"));
        assert_eq!(summary.parameter_index("n"), Some(3));
        assert_eq!(summary.preconditions().len(), 2);
        assert!(summary.preconditions()[1].is_deref_read());

        assert!(load_summaries(r#"[{"name": "f", "preconditions": [{"tag": "odd"}]}]"#).is_err());
        assert!(load_summaries(r#"{"functions": []}"#).is_err());
    }

    #[test]
    fn out_of_range_fields() {
        let access = json!({"address": {"stack": -8}, "mode": "w", "size": 4294967296i64});
        assert!(memory_access(&access).is_err());

        let offset = json!({"level": 4294967296u64, "lower": -8, "upper": -8});
        assert!(stackpointer_offset(&offset).is_err());
        let offset = json!({"level": 1, "lower": -8, "upper": -8});
        assert_eq!(stackpointer_offset(&offset).unwrap().nesting_level(), 1);
    }

    #[test]
    fn missing_architecture() {
        assert!(Json::parse(r#"{"functions": []}"#).is_err());
        let text = r#"{"arch": "vax", "functions": []}"#;
        assert!(load_binary(text, FunctionSummaryLibrary::new()).is_err());
        assert!(Json::parse(r#"{"arch": "mips"}"#).is_err());
    }
}
