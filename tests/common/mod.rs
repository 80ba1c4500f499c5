//! Minimal Hack assembler and CPU used to execute translator output.
#![allow(dead_code)]

use std::collections::HashMap;

use vmtrans::{translate_units, Config, Unit};

pub const SP: usize = 0;
pub const LCL: usize = 1;
pub const ARG: usize = 2;
pub const THIS: usize = 3;
pub const THAT: usize = 4;

const RAM_SIZE: usize = 0x8000;
const STEP_LIMIT: usize = 5_000_000;

/// Canonical Hack computations; anything else is rejected at assembly time.
const COMPS: &[&str] = &[
    "0", "1", "-1", "D", "A", "!D", "!A", "-D", "-A", "D+1", "A+1", "D-1", "A-1", "D+A", "D-A",
    "A-D", "D&A", "D|A", "M", "!M", "-M", "M+1", "M-1", "D+M", "D-M", "M-D", "D&M", "D|M",
];
const DESTS: &[&str] = &["M", "D", "MD", "A", "AM", "AD", "AMD"];
const JUMPS: &[&str] = &["JGT", "JEQ", "JGE", "JLT", "JNE", "JLE", "JMP"];

#[derive(Debug, Clone)]
enum Instr {
    A(i16),
    C {
        dest: String,
        comp: String,
        jump: Option<String>,
    },
}

pub struct Cpu {
    pub ram: Vec<i16>,
    program: Vec<Instr>,
    symbols: HashMap<String, i16>,
    pc: usize,
    a: i16,
    d: i16,
    halted: bool,
}

fn strip(line: &str) -> &str {
    line.split_once("//").map(|(s, _)| s).unwrap_or(line).trim()
}

fn predefined() -> HashMap<String, i16> {
    let mut symbols = HashMap::new();
    for (name, addr) in [("SP", 0), ("LCL", 1), ("ARG", 2), ("THIS", 3), ("THAT", 4)] {
        symbols.insert(name.to_string(), addr);
    }
    for r in 0..16 {
        symbols.insert(format!("R{}", r), r);
    }
    symbols.insert("SCREEN".to_string(), 16384);
    symbols.insert("KBD".to_string(), 24576);
    symbols
}

impl Cpu {
    pub fn assemble(asm: &str) -> Cpu {
        let mut symbols = predefined();

        let mut address = 0i16;
        for line in asm.lines().map(strip).filter(|l| !l.is_empty()) {
            if let Some(name) = line.strip_prefix('(').and_then(|l| l.strip_suffix(')')) {
                assert!(
                    symbols.insert(name.to_string(), address).is_none(),
                    "duplicate label ({})",
                    name
                );
            } else {
                address += 1;
            }
        }

        let mut next_var = 16;
        let mut program = vec![];
        for line in asm.lines().map(strip).filter(|l| !l.is_empty()) {
            if line.starts_with('(') {
                continue;
            }
            if let Some(value) = line.strip_prefix('@') {
                let value = match value.parse::<i16>() {
                    Ok(v) => v,
                    Err(_) => *symbols.entry(value.to_string()).or_insert_with(|| {
                        next_var += 1;
                        next_var - 1
                    }),
                };
                program.push(Instr::A(value));
                continue;
            }

            let (dest, rest) = match line.split_once('=') {
                Some((dest, rest)) => (dest.to_string(), rest),
                None => (String::new(), line),
            };
            let (comp, jump) = match rest.split_once(';') {
                Some((comp, jump)) => (comp.to_string(), Some(jump.to_string())),
                None => (rest.to_string(), None),
            };
            assert!(COMPS.contains(&comp.as_str()), "invalid comp in `{}`", line);
            assert!(
                dest.is_empty() || DESTS.contains(&dest.as_str()),
                "invalid dest in `{}`",
                line
            );
            if let Some(jump) = &jump {
                assert!(JUMPS.contains(&jump.as_str()), "invalid jump in `{}`", line);
            }
            program.push(Instr::C { dest, comp, jump });
        }

        Cpu {
            ram: vec![0; RAM_SIZE],
            program,
            symbols,
            pc: 0,
            a: 0,
            d: 0,
            halted: false,
        }
    }

    /// Address the assembler gave to a label or variable.
    pub fn symbol(&self, name: &str) -> usize {
        self.symbols[name] as usize
    }

    pub fn sp(&self) -> usize {
        self.ram[SP] as usize
    }

    /// Value `depth` slots below the top of the stack (0 is the top).
    pub fn peek(&self, depth: usize) -> i16 {
        self.ram[self.sp() - 1 - depth]
    }

    fn operand(&self, c: char) -> i16 {
        match c {
            'A' => self.a,
            'D' => self.d,
            'M' => self.ram[addr(self.a)],
            '1' => 1,
            _ => unreachable!(),
        }
    }

    fn compute(&self, comp: &str) -> i16 {
        let chars: Vec<char> = comp.chars().collect();
        match chars.as_slice() {
            ['0'] => 0,
            ['1'] => 1,
            ['-', '1'] => -1,
            [x] => self.operand(*x),
            ['-', x] => self.operand(*x).wrapping_neg(),
            ['!', x] => !self.operand(*x),
            [x, op, y] => {
                let (x, y) = (self.operand(*x), self.operand(*y));
                match op {
                    '+' => x.wrapping_add(y),
                    '-' => x.wrapping_sub(y),
                    '&' => x & y,
                    '|' => x | y,
                    _ => unreachable!(),
                }
            }
            _ => unreachable!(),
        }
    }

    fn step(&mut self) {
        let pc = self.pc;
        match self.program[pc].clone() {
            Instr::A(value) => {
                self.a = value;
                self.pc += 1;
            }
            Instr::C { dest, comp, jump } => {
                let value = self.compute(&comp);
                let target = self.a;
                if dest.contains('M') {
                    self.ram[addr(target)] = value;
                }
                if dest.contains('A') {
                    self.a = value;
                }
                if dest.contains('D') {
                    self.d = value;
                }
                let taken = match jump.as_deref() {
                    None => false,
                    Some("JGT") => value > 0,
                    Some("JEQ") => value == 0,
                    Some("JGE") => value >= 0,
                    Some("JLT") => value < 0,
                    Some("JNE") => value != 0,
                    Some("JLE") => value <= 0,
                    Some("JMP") => true,
                    Some(other) => panic!("bad jump {}", other),
                };
                if taken {
                    let target = addr(target);
                    // `(L) @L 0;JMP` spins forever
                    if comp == "0" && target + 1 == pc {
                        self.halted = true;
                    }
                    self.pc = target;
                } else {
                    self.pc += 1;
                }
            }
        }
    }

    /// Runs until the program falls off its end or parks in a tight loop.
    pub fn run(&mut self) -> usize {
        let mut steps = 0;
        while !self.halted && self.pc < self.program.len() {
            self.step();
            steps += 1;
            assert!(steps < STEP_LIMIT, "program did not finish");
        }
        steps
    }
}

fn addr(a: i16) -> usize {
    assert!(a >= 0, "negative address {}", a);
    a as usize
}

/// Stack origin and segment bases used when running code without a preamble.
pub const STACK: i16 = 256;
pub const LOCAL_BASE: i16 = 300;
pub const ARG_BASE: i16 = 400;
pub const THIS_BASE: i16 = 3000;
pub const THAT_BASE: i16 = 3010;

/// Keeps driver progress lines off the test output.
pub fn quiet() {
    vmtrans::log::set_enabled(false);
}

/// Translates `units` with the default configuration.
pub fn translate_all(units: &[Unit]) -> String {
    quiet();
    translate_units(units, &Config::default()).unwrap()
}

/// Assembles `asm` with SP and the segment bases preset.
pub fn machine(asm: &str) -> Cpu {
    let mut cpu = Cpu::assemble(asm);
    cpu.ram[SP] = STACK;
    cpu.ram[LCL] = LOCAL_BASE;
    cpu.ram[ARG] = ARG_BASE;
    cpu.ram[THIS] = THIS_BASE;
    cpu.ram[THAT] = THAT_BASE;
    cpu
}

/// Translates a single unit named `Test`, no preamble.
pub fn translate(src: &str) -> String {
    translate_all(&[Unit::new("Test", src)])
}

/// Translates and runs `src` on a preset machine.
pub fn execute(src: &str) -> Cpu {
    let mut cpu = machine(&translate(src));
    cpu.run();
    cpu
}

/// Runs `src` with `stack` already pushed above the stack origin.
pub fn execute_on(stack: &[i16], src: &str) -> Cpu {
    let mut cpu = machine(&translate(src));
    for (i, value) in stack.iter().enumerate() {
        cpu.ram[STACK as usize + i] = *value;
    }
    cpu.ram[SP] = STACK + stack.len() as i16;
    cpu.run();
    cpu
}
