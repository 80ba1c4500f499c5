use std::collections::HashSet;

use crate::ast::{ArithmeticOp::*, Command::*, Segment::*, *};
use crate::error::{Error, Result};

macro_rules! svec {
    ($($x:expr),* $(,)?) => (vec![$($x.to_string()),*]);
}

/// Largest value an A-instruction can load.
const MAX_CONSTANT: u16 = 0x7FFF;
/// Words pushed by `call` on top of the arguments.
const FRAME_SIZE: u16 = 5;
const TEMP_SLOTS: u16 = 8;

fn at_c(arg: u16) -> String {
    format!("@{}", arg)
}

fn at_s(arg: &str) -> String {
    format!("@{}", arg)
}

fn label(sym: &str) -> String {
    format!("({})", sym)
}

/// Push D onto the stack
fn push_d() -> Vec<String> {
    svec![
        "@SP",
        "M=M+1",
        "A=M-1", // Don't need to refetch SP; this is safe
        "M=D"
    ]
}

/// Pop the stack into D
fn pop_d() -> Vec<String> {
    svec!["@SP", "AM=M-1", "D=M"]
}

/// Push microcode for the four base segments
fn seg_push(seg: &str, arg: u16) -> Vec<String> {
    let mut out = svec![
        at_s(seg),
        "D=M",
        at_c(arg),
        "A=D+A", // A = SEG+arg
        "D=M"    // D = value to push
    ];
    out.extend(push_d());
    out
}

fn seg_push_direct(sym: &str) -> Vec<String> {
    let mut out = svec![at_s(sym), "D=M"];
    out.extend(push_d());
    out
}

fn seg_pop(seg: &str, arg: u16) -> Vec<String> {
    let mut out = svec![
        at_s(seg),
        "D=M",
        at_c(arg),
        "D=D+A", // D = SEG+arg
        "@R13",
        "M=D" // Store target addr in R13
    ];
    out.extend(pop_d());
    out.extend(svec![
        "@R13",
        "A=M", // At the target address...
        "M=D"  // ... store the popped val
    ]);
    out
}

fn seg_pop_direct(sym: &str) -> Vec<String> {
    let mut out = pop_d();
    out.extend(svec![at_s(sym), "M=D"]);
    out
}

fn simple_un_op(op: char) -> Vec<String> {
    svec!["@SP", "A=M-1", format!("M={}M", op)]
}

// i.e. no conditions or jumps, just pop and run
fn simple_bin_op(comp: &str) -> Vec<String> {
    svec![
        "@SP",
        "AM=M-1", // SP--, looking at top of stack now
        "D=M",    // Right arg in D
        "A=A-1",  // Looking at second arg of stack, will overwrite
        format!("M={}", comp)
    ]
}

type Emit<T> = std::result::Result<T, String>;

/// Offsets into base segments are loaded with an A-instruction.
fn base_index(arg: u16) -> Emit<u16> {
    if arg > MAX_CONSTANT {
        return Err(format!("index {} exceeds {}", arg, MAX_CONSTANT));
    }
    Ok(arg)
}

/// Counters and unit name shared by every unit of one translation run.
///
/// The counters only ever grow, so generated comparison and return labels
/// stay unique across all units written to the same artifact.
#[derive(Debug, Default, Clone)]
pub struct GeneratorState {
    comparisons: usize,
    calls: usize,
    unit: String,
}

impl GeneratorState {
    fn next_comparison(&mut self) -> usize {
        let tmp = self.comparisons;
        self.comparisons += 1;
        tmp
    }

    fn next_call(&mut self) -> usize {
        let tmp = self.calls;
        self.calls += 1;
        tmp
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }
}

/// Emits Hack assembly for VM commands.
#[derive(Debug, Default)]
pub struct Translator {
    state: GeneratorState,
    function: Option<String>,
    labels: HashSet<String>,
    functions: HashSet<String>,
    /// Every label declared so far in the run, generated or not.
    symbols: HashSet<String>,
}

impl Translator {
    pub fn new() -> Self {
        Translator::default()
    }

    pub fn state(&self) -> &GeneratorState {
        &self.state
    }

    /// Switches the static namespace to `unit`. Must precede the unit's
    /// first command.
    pub fn set_unit(&mut self, unit: &str) {
        self.state.unit = unit.to_string();
        self.function = None;
        self.labels.clear();
    }

    /// Declares `sym` as a branch target, failing if the run already has it.
    fn declare(&mut self, sym: &str) -> Emit<String> {
        if !self.symbols.insert(sym.to_string()) {
            return Err(format!("symbol `{}` is already declared", sym));
        }
        Ok(label(sym))
    }

    fn static_sym(&self, arg: u16) -> String {
        format!("{}.{}", self.state.unit, arg)
    }

    /// Direct address for the temp/pointer/static segments.
    fn direct_sym(&self, segment: Segment, arg: u16) -> Emit<String> {
        match segment {
            Static => Ok(self.static_sym(arg)),
            Temp if arg < TEMP_SLOTS => Ok(format!("R{}", arg + 5)),
            Temp => Err(format!("temp index {} out of range 0..{}", arg, TEMP_SLOTS)),
            Pointer => match arg {
                0 => Ok("THIS".to_string()),
                1 => Ok("THAT".to_string()),
                _ => Err(format!("pointer index {} out of range 0..2", arg)),
            },
            _ => unreachable!("{:?} is not a direct segment", segment),
        }
    }

    fn push(&self, segment: Segment, arg: u16) -> Emit<Vec<String>> {
        match segment {
            Constant if arg > MAX_CONSTANT => {
                Err(format!("constant {} exceeds {}", arg, MAX_CONSTANT))
            }
            Constant => {
                let mut out = svec![at_c(arg), "D=A"];
                out.extend(push_d());
                Ok(out)
            }
            Local => Ok(seg_push("LCL", base_index(arg)?)),
            Argument => Ok(seg_push("ARG", base_index(arg)?)),
            This => Ok(seg_push("THIS", base_index(arg)?)),
            That => Ok(seg_push("THAT", base_index(arg)?)),
            Static | Temp | Pointer => Ok(seg_push_direct(&self.direct_sym(segment, arg)?)),
        }
    }

    fn pop(&self, segment: Segment, arg: u16) -> Emit<Vec<String>> {
        match segment {
            Constant => Err("cannot pop into the constant segment".to_string()),
            Local => Ok(seg_pop("LCL", base_index(arg)?)),
            Argument => Ok(seg_pop("ARG", base_index(arg)?)),
            This => Ok(seg_pop("THIS", base_index(arg)?)),
            That => Ok(seg_pop("THAT", base_index(arg)?)),
            Static | Temp | Pointer => Ok(seg_pop_direct(&self.direct_sym(segment, arg)?)),
        }
    }

    fn arithmetic(&mut self, op: ArithmeticOp) -> Emit<Vec<String>> {
        match op {
            Add => Ok(simple_bin_op("D+M")),
            Sub => Ok(simple_bin_op("M-D")),
            And => Ok(simple_bin_op("D&M")),
            Or => Ok(simple_bin_op("D|M")),
            Neg => Ok(simple_un_op('-')),
            Not => Ok(simple_un_op('!')),
            Eq => self.equal(),
            Gt => self.order(op, "JGT"),
            Lt => self.order(op, "JLT"),
        }
    }

    /// Tail shared by comparisons: D holds a value whose sign decides the
    /// result, the operands are already popped down to x's slot.
    fn set_result(&mut self, true_sym: &str, end_sym: &str, jump: &str) -> Emit<Vec<String>> {
        Ok(svec![
            at_s(true_sym),
            format!("D;{}", jump),
            "@SP",
            "A=M-1",
            "M=0", // false
            at_s(end_sym),
            "0;JMP",
            self.declare(true_sym)?,
            "@SP",
            "A=M-1",
            "M=-1", // true
            self.declare(end_sym)?
        ])
    }

    fn equal(&mut self) -> Emit<Vec<String>> {
        let n = self.state.next_comparison();
        let mut out = svec![
            "@SP",
            "AM=M-1", // SP--, looking at top of stack now
            "D=M",    // Right arg in D
            "A=A-1",  // Looking at second arg of stack, will overwrite
            "D=M-D"   // Wraparound still yields 0 only when x == y
        ];
        out.extend(self.set_result(
            &format!("eq_true_{}", n),
            &format!("eq_end_{}", n),
            "JEQ",
        )?);
        Ok(out)
    }

    /// gt/lt. x - y can overflow when the signs differ, so the sign of the
    /// difference is decided from the operand signs in that case.
    fn order(&mut self, op: ArithmeticOp, jump: &str) -> Emit<Vec<String>> {
        let n = self.state.next_comparison();
        let name = op.name();
        let sym = |part: &str| format!("{}_{}_{}", name, part, n);
        let (xneg, same, test) = (sym("xneg"), sym("same"), sym("test"));

        let mut out = svec![
            "@SP",
            "AM=M-1", // SP--, y stays readable at RAM[SP]
            "A=A-1",
            "D=M", // D = x
            at_s(&xneg),
            "D;JLT",
            "@SP",
            "A=M",
            "D=M", // D = y, x >= 0
            at_s(&same),
            "D;JGE",
            "D=1", // x >= 0 > y
            at_s(&test),
            "0;JMP",
            self.declare(&xneg)?,
            "@SP",
            "A=M",
            "D=M", // D = y, x < 0
            at_s(&same),
            "D;JLT",
            "D=-1", // x < 0 <= y
            at_s(&test),
            "0;JMP",
            self.declare(&same)?,
            "@SP",
            "A=M",
            "D=M",
            "A=A-1",
            "D=M-D", // Same sign, no overflow
            self.declare(&test)?
        ];
        out.extend(self.set_result(&sym("true"), &sym("end"), jump)?);
        Ok(out)
    }

    /// Convert VM label to Hack ASM symbol - for consistency across instructions
    fn label_to_sym(&self, name: &str) -> String {
        let scope = self.function.as_deref().unwrap_or(&self.state.unit);
        format!("{}${}", scope, name)
    }

    fn label(&mut self, name: &str) -> Emit<Vec<String>> {
        let sym = self.label_to_sym(name);
        if !self.labels.insert(name.to_string()) {
            return Err(format!("label `{}` already declared in this function", name));
        }
        Ok(svec![self.declare(&sym)?])
    }

    fn goto(&self, name: &str) -> Vec<String> {
        svec![
            at_s(&self.label_to_sym(name)),
            "0;JMP" // Unconditional jump
        ]
    }

    fn if_goto(&self, name: &str) -> Vec<String> {
        let mut out = pop_d(); // Stack popped into D
        out.extend(svec![
            at_s(&self.label_to_sym(name)),
            "D;JNE" // False is 0
        ]);
        out
    }

    fn function(&mut self, name: &str, locals: u16) -> Emit<Vec<String>> {
        if !self.functions.insert(name.to_string()) {
            return Err(format!("function `{}` already declared", name));
        }
        self.function = Some(name.to_string());
        self.labels.clear();

        let mut out = svec![self.declare(name)?];
        for _ in 0..locals {
            out.extend(svec!["@SP", "M=M+1", "A=M-1", "M=0"]);
        }
        Ok(out)
    }

    /// Emits the calling sequence. Used for VM `call` and for the preamble.
    fn call(&mut self, name: &str, args: u16) -> Emit<Vec<String>> {
        if args > MAX_CONSTANT - FRAME_SIZE {
            return Err(format!("{} arguments exceed the frame limit", args));
        }
        let ret = format!("{}$ret.{}", name, self.state.next_call());

        let mut out = svec![at_s(&ret), "D=A"];
        out.extend(push_d());
        for saved in ["LCL", "ARG", "THIS", "THAT"] {
            out.extend(seg_push_direct(saved));
        }
        out.extend(svec![
            "@SP",
            "D=M",
            at_c(args + FRAME_SIZE),
            "D=D-A",
            "@ARG",
            "M=D", // ARG = SP - args - 5
            "@SP",
            "D=M",
            "@LCL",
            "M=D", // LCL = SP
            at_s(name),
            "0;JMP",
            self.declare(&ret)?
        ]);
        Ok(out)
    }

    fn ret(&self) -> Vec<String> {
        let mut out = svec![
            "@LCL",
            "D=M",
            "@R13",
            "M=D", // frame = LCL
            at_c(FRAME_SIZE),
            "A=D-A",
            "D=M",
            "@R14",
            "M=D" // Return address, read before *ARG may overwrite it
        ];
        out.extend(pop_d());
        out.extend(svec![
            "@ARG",
            "A=M",
            "M=D", // *ARG = return value
            "@ARG",
            "D=M+1",
            "@SP",
            "M=D" // SP = ARG + 1
        ]);
        for restored in ["THAT", "THIS", "ARG", "LCL"] {
            out.extend(svec!["@R13", "AM=M-1", "D=M", at_s(restored), "M=D"]);
        }
        out.extend(svec!["@R14", "A=M", "0;JMP"]);
        out
    }

    /// Sets SP to `stack_origin` and calls `entry` with no arguments.
    pub fn bootstrap(&mut self, stack_origin: u16, entry: &str) -> Vec<String> {
        let mut out = svec!["// Bootstrap code", at_c(stack_origin), "D=A", "@SP", "M=D"];
        out.push(format!("// call {} 0", entry));
        // Zero arguments always fit, and nothing is declared before the preamble.
        out.extend(self.call(entry, 0).unwrap_or_default());
        out
    }

    /// Translates one command, prefixed by a comment echoing it.
    pub fn translate_command(&mut self, source: &SourceCommand) -> Result<Vec<String>> {
        let command = &source.command;
        let translated = match command {
            Arithmetic(op) => self.arithmetic(*op),
            Push(seg, arg) => self.push(*seg, *arg),
            Pop(seg, arg) => self.pop(*seg, *arg),
            Label(sym) => self.label(sym),
            Goto(sym) => Ok(self.goto(sym)),
            IfGoto(sym) => Ok(self.if_goto(sym)),
            Function(name, locals) => self.function(name, *locals),
            Call(name, args) => self.call(name, *args),
            Return => Ok(self.ret()),
        };

        let body = translated.map_err(|reason| Error::Codegen {
            unit: self.state.unit.clone(),
            line: source.line,
            command: command.to_string(),
            reason,
        })?;

        let mut instructions = Vec::with_capacity(body.len() + 1);
        instructions.push(format!("// {}", command));
        instructions.extend(body);
        Ok(instructions)
    }

    pub fn translate(&mut self, commands: &[SourceCommand]) -> Result<Vec<String>> {
        let mut instructions: Vec<String> = vec![];

        for command in commands {
            instructions.extend(self.translate_command(command)?);
        }

        Ok(instructions)
    }
}
