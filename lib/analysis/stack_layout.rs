//! Reconstruction of a function's stack frame.
//!
//! A `StackLayout` is built from the instructions of one function which touch
//! the stack, in program order. Instructions are collected with a
//! `StackLayoutBuilder`, and `StackLayoutBuilder::build` computes the frame
//! size, the saved-register slots and the accesses made to every stack offset
//! once. The resulting layout is immutable.

use crate::analysis::{perfect, StackPointerOffset};
use crate::binary::{InstrAddr, Instruction};
use crate::Error;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Frame size reported when the stack pointer is not known exactly at every
/// instruction.
pub const UNKNOWN_FRAME_SIZE: i64 = -1;

/// The instructions accessing one stack offset.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackAccess<'f> {
    offset: i64,
    size: Option<i32>,
    reads: Vec<&'f Instruction>,
    writes: Vec<&'f Instruction>,
    escapes: Vec<&'f Instruction>,
}

impl<'f> StackAccess<'f> {
    pub fn new(offset: i64) -> StackAccess<'f> {
        StackAccess {
            offset,
            size: None,
            reads: Vec::new(),
            writes: Vec::new(),
            escapes: Vec::new(),
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// The largest access size seen at this offset.
    pub fn size(&self) -> Option<i32> {
        self.size
    }

    /// Record an access of `size` bytes. The tracked size never decreases.
    pub fn update_size(&mut self, size: Option<i32>) {
        self.size = match (self.size, size) {
            (Some(current), Some(size)) => Some(current.max(size)),
            (current, None) => current,
            (None, size) => size,
        };
    }

    pub fn add_read(&mut self, instruction: &'f Instruction) {
        self.reads.push(instruction);
    }

    pub fn add_write(&mut self, instruction: &'f Instruction) {
        self.writes.push(instruction);
    }

    /// Record that the address of this offset is passed to a call.
    pub fn add_escape(&mut self, instruction: &'f Instruction) {
        self.escapes.push(instruction);
    }

    pub fn reads(&self) -> &[&'f Instruction] {
        &self.reads
    }

    pub fn writes(&self) -> &[&'f Instruction] {
        &self.writes
    }

    pub fn escapes(&self) -> &[&'f Instruction] {
        &self.escapes
    }

    pub fn is_escaped(&self) -> bool {
        !self.escapes.is_empty()
    }
}

impl<'f> fmt::Display for StackAccess<'f> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:>6}", self.offset)?;
        match self.size {
            Some(size) => write!(f, " ({:>3})", size)?,
            None => write!(f, " (  ?)")?,
        }
        for (label, instructions) in [
            ("R", &self.reads),
            ("W", &self.writes),
            ("E", &self.escapes),
        ] {
            if !instructions.is_empty() {
                let addresses = instructions
                    .iter()
                    .map(|instruction| instruction.address().to_string())
                    .collect::<Vec<String>>();
                write!(f, " {}: {}", label, addresses.join(", "))?;
            }
        }
        Ok(())
    }
}

/// A stack slot used to save a register.
///
/// A saved register is identified by the register and the offset it is saved
/// at. All spills and restores of that register at that offset accumulate
/// here.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SavedRegister<'f> {
    register: String,
    offset: i64,
    spills: Vec<&'f Instruction>,
    restores: Vec<&'f Instruction>,
}

impl<'f> SavedRegister<'f> {
    pub fn new<S>(register: S, offset: i64) -> SavedRegister<'f>
    where
        S: Into<String>,
    {
        SavedRegister {
            register: register.into(),
            offset,
            spills: Vec::new(),
            restores: Vec::new(),
        }
    }

    pub fn register(&self) -> &str {
        &self.register
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn add_spill(&mut self, instruction: &'f Instruction) {
        self.spills.push(instruction);
    }

    pub fn add_restore(&mut self, instruction: &'f Instruction) {
        self.restores.push(instruction);
    }

    pub fn spills(&self) -> &[&'f Instruction] {
        &self.spills
    }

    pub fn restores(&self) -> &[&'f Instruction] {
        &self.restores
    }
}

impl<'f> fmt::Display for SavedRegister<'f> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let spills = self
            .spills
            .iter()
            .map(|instruction| instruction.address().to_string())
            .collect::<Vec<String>>();
        let restores = self
            .restores
            .iter()
            .map(|instruction| instruction.address().to_string())
            .collect::<Vec<String>>();
        write!(
            f,
            "{:<6} {:>6} spills: [{}] restores: [{}]",
            self.register,
            self.offset,
            spills.join(", "),
            restores.join(", ")
        )
    }
}

/// A contiguous region of the stack starting at `offset`.
///
/// `lowerbound` and `upperbound` are the offsets of the near and far edges of
/// the region, when known.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct StackBuffer {
    offset: i64,
    lowerbound: Option<i64>,
    upperbound: Option<i64>,
}

impl StackBuffer {
    pub fn new(offset: i64, lowerbound: Option<i64>, upperbound: Option<i64>) -> StackBuffer {
        StackBuffer {
            offset,
            lowerbound,
            upperbound,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn lowerbound(&self) -> Option<i64> {
        self.lowerbound
    }

    pub fn upperbound(&self) -> Option<i64> {
        self.upperbound
    }

    /// The largest size this buffer may have.
    pub fn maxsize(&self) -> Option<i64> {
        self.upperbound.and_then(|upperbound| upperbound.checked_sub(self.offset))
    }

    /// The smallest size this buffer may have.
    pub fn minsize(&self) -> Option<i64> {
        self.lowerbound.and_then(|lowerbound| lowerbound.checked_sub(self.offset))
    }

    /// The size of this buffer, only when both of its bounds are known and
    /// agree.
    pub fn size(&self) -> Option<i64> {
        match (self.lowerbound, self.upperbound) {
            (Some(lowerbound), Some(upperbound)) if lowerbound == upperbound => self.maxsize(),
            _ => None,
        }
    }
}

impl fmt::Display for StackBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bound = |b: Option<i64>| match b {
            Some(b) => b.to_string(),
            None => "?".to_string(),
        };
        write!(
            f,
            "buffer@{} [{}; {}]",
            self.offset,
            bound(self.lowerbound),
            bound(self.upperbound)
        )
    }
}

/// Collects the instructions of a function which touch the stack.
#[derive(Clone, Debug, Default)]
pub struct StackLayoutBuilder<'f> {
    offsets: BTreeMap<InstrAddr, StackPointerOffset>,
    accesses: Vec<&'f Instruction>,
}

impl<'f> StackLayoutBuilder<'f> {
    pub fn new() -> StackLayoutBuilder<'f> {
        StackLayoutBuilder {
            offsets: BTreeMap::new(),
            accesses: Vec::new(),
        }
    }

    /// Add an instruction which touches the stack. Instructions must be added
    /// in program order.
    pub fn add_access(&mut self, instruction: &'f Instruction) {
        self.add_instr_offset(
            instruction.address().clone(),
            instruction.stackpointer_offset().clone(),
        );
        self.accesses.push(instruction);
    }

    /// Record the stack pointer offset at an instruction. A later offset for
    /// the same address replaces an earlier one.
    pub fn add_instr_offset(&mut self, address: InstrAddr, offset: StackPointerOffset) {
        self.offsets.insert(address, offset);
    }

    fn frame_size(&self) -> i64 {
        if !perfect(self.offsets.values()) {
            trace!("frame size unknown: stack pointer offsets are not all exact");
            return UNKNOWN_FRAME_SIZE;
        }
        match self.offsets.values().filter_map(|offset| offset.value()).min() {
            Some(min) => min.checked_neg().unwrap_or_else(|| {
                trace!("frame size unknown: lowest offset {} out of range", min);
                UNKNOWN_FRAME_SIZE
            }),
            None => 0,
        }
    }

    fn saved_registers(&self) -> Result<BTreeMap<(String, i64), SavedRegister<'f>>, Error> {
        let mut saved_registers: BTreeMap<(String, i64), SavedRegister<'f>> = BTreeMap::new();
        for &instruction in &self.accesses {
            for access in instruction.memory_accesses() {
                if !access.is_stack_address() {
                    continue;
                }
                let register = match access.register() {
                    Some(register) => register,
                    None => continue,
                };
                let offset = access.stack_offset()?;
                let saved_register = saved_registers
                    .entry((register.to_string(), offset))
                    .or_insert_with(|| SavedRegister::new(register, offset));
                if access.is_register_spill() {
                    saved_register.add_spill(instruction);
                } else if access.is_register_restore() {
                    saved_register.add_restore(instruction);
                }
            }
        }
        Ok(saved_registers)
    }

    fn layout(&self) -> Result<BTreeMap<i64, StackAccess<'f>>, Error> {
        let mut layout: BTreeMap<i64, StackAccess<'f>> = BTreeMap::new();
        for &instruction in &self.accesses {
            for access in instruction.memory_accesses() {
                if !access.is_stack_address() {
                    continue;
                }
                let offset = access.stack_offset()?;
                let stack_access = layout
                    .entry(offset)
                    .or_insert_with(|| StackAccess::new(offset));
                stack_access.update_size(access.size());
                if access.is_read() {
                    stack_access.add_read(instruction);
                }
                if access.is_write() {
                    stack_access.add_write(instruction);
                }
            }
            if instruction.is_call_instruction() {
                for argument in instruction.call_arguments() {
                    if !argument.is_stack_address() {
                        continue;
                    }
                    let offset = argument.stack_address_offset()?;
                    layout
                        .entry(offset)
                        .or_insert_with(|| StackAccess::new(offset))
                        .add_escape(instruction);
                }
            }
        }
        Ok(layout)
    }

    /// Compute the layout of the stack from the collected instructions.
    pub fn build(self) -> Result<StackLayout<'f>, Error> {
        let size = self.frame_size();
        let saved_registers = self.saved_registers()?;
        let layout = self.layout()?;
        debug!(
            "stack layout: {} accesses, {} offsets, {} saved registers, size {}",
            self.accesses.len(),
            layout.len(),
            saved_registers.len(),
            size
        );
        Ok(StackLayout {
            offsets: self.offsets,
            accesses: self.accesses,
            saved_registers,
            layout,
            size,
        })
    }
}

/// The reconstructed stack frame of one function.
#[derive(Clone, Debug)]
pub struct StackLayout<'f> {
    offsets: BTreeMap<InstrAddr, StackPointerOffset>,
    accesses: Vec<&'f Instruction>,
    saved_registers: BTreeMap<(String, i64), SavedRegister<'f>>,
    layout: BTreeMap<i64, StackAccess<'f>>,
    size: i64,
}

impl<'f> StackLayout<'f> {
    /// The size of the stack frame, or `UNKNOWN_FRAME_SIZE` if the stack
    /// pointer is not known exactly at every instruction.
    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn has_known_size(&self) -> bool {
        self.size != UNKNOWN_FRAME_SIZE
    }

    pub fn offsets(&self) -> &BTreeMap<InstrAddr, StackPointerOffset> {
        &self.offsets
    }

    pub fn offset(&self, address: &InstrAddr) -> Option<&StackPointerOffset> {
        self.offsets.get(address)
    }

    /// The instructions which touch the stack, in program order.
    pub fn accesses(&self) -> &[&'f Instruction] {
        &self.accesses
    }

    pub fn saved_registers(&self) -> &BTreeMap<(String, i64), SavedRegister<'f>> {
        &self.saved_registers
    }

    pub fn saved_register(&self, register: &str, offset: i64) -> Option<&SavedRegister<'f>> {
        self.saved_registers.get(&(register.to_string(), offset))
    }

    /// Accesses made to each stack offset.
    pub fn layout(&self) -> &BTreeMap<i64, StackAccess<'f>> {
        &self.layout
    }

    pub fn stack_access(&self, offset: i64) -> Option<&StackAccess<'f>> {
        self.layout.get(&offset)
    }

    pub fn is_saved_register_slot(&self, offset: i64) -> bool {
        self.saved_registers
            .values()
            .any(|saved_register| saved_register.offset() == offset)
    }

    /// The buffer starting at `offset`.
    ///
    /// A saved-register slot is a buffer of four bytes. Any other buffer
    /// extends up to the nearest saved-register slot above it, and is
    /// unbounded if there is none.
    pub fn stackbuffer(&self, offset: i64) -> Option<StackBuffer> {
        if !self.layout.contains_key(&offset) {
            return None;
        }
        if self.is_saved_register_slot(offset) {
            let end = offset.checked_add(4);
            return Some(StackBuffer::new(offset, end, end));
        }
        let mut lowerbound = None;
        for &above in self.layout.keys().filter(|&&above| above > offset) {
            lowerbound = Some(above);
            if self.is_saved_register_slot(above) {
                return Some(StackBuffer::new(offset, lowerbound, Some(above)));
            }
        }
        None
    }
}

impl<'f> fmt::Display for StackLayout<'f> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.has_known_size() {
            writeln!(f, "Stack frame size: {}", self.size)?;
        } else {
            writeln!(f, "Stack frame size: unknown")?;
        }
        writeln!(f, "Saved registers:")?;
        for saved_register in self.saved_registers.values() {
            writeln!(f, "  {}", saved_register)?;
        }
        writeln!(f, "Stack accesses:")?;
        for access in self.layout.values().rev() {
            writeln!(f, "  {}", access)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{Call, CallTarget, MemoryAccess};
    use crate::invariants::{Interval, Xpr};

    fn instruction(address: u64, offset: StackPointerOffset) -> Instruction {
        Instruction::new(InstrAddr::from_u64(address), "nop", offset)
    }

    fn layout_of(instructions: &[Instruction]) -> StackLayout<'_> {
        let mut builder = StackLayoutBuilder::new();
        for instruction in instructions {
            builder.add_access(instruction);
        }
        builder.build().unwrap()
    }

    /// A small MIPS-style frame: ra saved at -4, a buffer at -40 passed to a
    /// call, and a local at -44.
    fn frame() -> Vec<Instruction> {
        vec![
            instruction(0x1000, StackPointerOffset::exact(0)),
            instruction(0x1004, StackPointerOffset::exact(-48)).with_memory_access(
                MemoryAccess::register_spill("ra", Xpr::stack_address(-4), Some(4)),
            ),
            instruction(0x1008, StackPointerOffset::exact(-48))
                .with_memory_access(MemoryAccess::write(Xpr::stack_address(-44), Some(4))),
            instruction(0x100c, StackPointerOffset::exact(-48)).with_call(Call::new(
                CallTarget::stub("strcpy"),
                vec![Xpr::stack_address(-40), Xpr::register("a1")],
            )),
            instruction(0x1010, StackPointerOffset::exact(-48))
                .with_memory_access(MemoryAccess::read(Xpr::stack_address(-44), Some(1))),
            instruction(0x1014, StackPointerOffset::exact(-48)).with_memory_access(
                MemoryAccess::register_restore("ra", Xpr::stack_address(-4), Some(4)),
            ),
        ]
    }

    #[test]
    fn frame_size_from_exact_offsets() {
        let instructions = vec![
            instruction(0x10, StackPointerOffset::exact(-20)),
            instruction(0x14, StackPointerOffset::exact(-40)),
            instruction(0x18, StackPointerOffset::exact(-16)),
        ];
        assert_eq!(layout_of(&instructions).size(), 40);
    }

    #[test]
    fn frame_size_unknown_with_open_offset() {
        let instructions = vec![
            instruction(0x10, StackPointerOffset::exact(-20)),
            instruction(0x14, StackPointerOffset::exact(-40)),
            instruction(0x18, StackPointerOffset::new(0, Interval::lower_only(-16))),
        ];
        let layout = layout_of(&instructions);
        assert_eq!(layout.size(), -1);
        assert!(!layout.has_known_size());

        let instructions = vec![
            instruction(0x10, StackPointerOffset::exact(-20)),
            instruction(0x14, StackPointerOffset::new(0, Interval::closed(-40, -32))),
        ];
        assert_eq!(layout_of(&instructions).size(), UNKNOWN_FRAME_SIZE);
    }

    #[test]
    fn frame_size_unknown_when_lowest_offset_has_no_negation() {
        let instructions = vec![
            instruction(0x10, StackPointerOffset::exact(0)),
            instruction(0x14, StackPointerOffset::exact(i64::MIN)),
        ];
        assert_eq!(layout_of(&instructions).size(), UNKNOWN_FRAME_SIZE);
    }

    #[test]
    fn buffer_size_out_of_range() {
        let buffer = StackBuffer::new(i64::MIN, Some(i64::MAX), Some(i64::MAX));
        assert_eq!(buffer.maxsize(), None);
        assert_eq!(buffer.size(), None);
    }

    #[test]
    fn readded_instruction_replaces_offset() {
        let mut builder = StackLayoutBuilder::new();
        let address = InstrAddr::from_u64(0x10);
        builder.add_instr_offset(address.clone(), StackPointerOffset::unknown());
        builder.add_instr_offset(address.clone(), StackPointerOffset::exact(-8));
        let layout = builder.build().unwrap();
        assert_eq!(layout.offsets().len(), 1);
        assert_eq!(layout.offset(&address), Some(&StackPointerOffset::exact(-8)));
        assert_eq!(layout.size(), 8);
    }

    #[test]
    fn update_size_is_monotone() {
        let mut access = StackAccess::new(-8);
        assert_eq!(access.size(), None);
        access.update_size(Some(4));
        access.update_size(Some(1));
        assert_eq!(access.size(), Some(4));
        access.update_size(None);
        assert_eq!(access.size(), Some(4));
        access.update_size(Some(8));
        assert_eq!(access.size(), Some(8));
    }

    #[test]
    fn saved_registers_accumulate() {
        let instructions = frame();
        let layout = layout_of(&instructions);

        assert_eq!(layout.saved_registers().len(), 1);
        let ra = layout.saved_register("ra", -4).unwrap();
        assert_eq!(ra.spills().len(), 1);
        assert_eq!(ra.restores().len(), 1);
        assert_eq!(ra.spills()[0].address(), &InstrAddr::from_u64(0x1004));
        assert!(layout.saved_register("ra", -8).is_none());
        assert!(layout.is_saved_register_slot(-4));
        assert!(!layout.is_saved_register_slot(-44));
    }

    #[test]
    fn layout_records_reads_writes_and_escapes() {
        let instructions = frame();
        let layout = layout_of(&instructions);

        assert_eq!(layout.accesses().len(), 6);
        assert_eq!(
            layout.layout().keys().cloned().collect::<Vec<i64>>(),
            vec![-44, -40, -4]
        );

        let local = layout.stack_access(-44).unwrap();
        assert_eq!(local.size(), Some(4));
        assert_eq!(local.reads().len(), 1);
        assert_eq!(local.writes().len(), 1);
        assert!(!local.is_escaped());

        let buffer = layout.stack_access(-40).unwrap();
        assert_eq!(buffer.size(), None);
        assert!(buffer.is_escaped());
        assert_eq!(buffer.escapes()[0].address(), &InstrAddr::from_u64(0x100c));
    }

    #[test]
    fn stackbuffer_queries() {
        let instructions = frame();
        let layout = layout_of(&instructions);

        let slot = layout.stackbuffer(-4).unwrap();
        assert_eq!(slot.size(), Some(4));

        let buffer = layout.stackbuffer(-40).unwrap();
        assert_eq!(buffer.offset(), -40);
        assert_eq!(buffer.lowerbound(), Some(-4));
        assert_eq!(buffer.upperbound(), Some(-4));
        assert_eq!(buffer.size(), Some(36));

        assert_eq!(layout.stackbuffer(-36), None);
    }

    #[test]
    fn stackbuffer_without_saved_register_above() {
        let instructions = vec![
            instruction(0x10, StackPointerOffset::exact(-16))
                .with_memory_access(MemoryAccess::write(Xpr::stack_address(-16), Some(4))),
            instruction(0x14, StackPointerOffset::exact(-16))
                .with_memory_access(MemoryAccess::write(Xpr::stack_address(-8), Some(4))),
        ];
        let layout = layout_of(&instructions);
        assert_eq!(layout.stackbuffer(-16), None);
        assert_eq!(layout.stackbuffer(-8), None);
    }

    #[test]
    fn stackbuffer_sizes() {
        let buffer = StackBuffer::new(-40, Some(-32), Some(-4));
        assert_eq!(buffer.minsize(), Some(8));
        assert_eq!(buffer.maxsize(), Some(36));
        assert_eq!(buffer.size(), None);

        let buffer = StackBuffer::new(-40, None, Some(-4));
        assert_eq!(buffer.minsize(), None);
        assert_eq!(buffer.size(), None);
    }

    #[test]
    fn display_lists_offsets_in_descending_order() {
        let instructions = frame();
        let text = layout_of(&instructions).to_string();
        assert!(text.starts_with("Stack frame size: 48\n"));
        let top = text.find("    -4").unwrap();
        let bottom = text.find("   -44").unwrap();
        assert!(top < bottom);
    }
}
