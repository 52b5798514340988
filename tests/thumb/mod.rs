//! Just enough of the Cortex-M0 Thumb instruction set to execute what the
//! code generator emits, with `__aeabi_idiv` built in. `BL` to a label
//! leaves the index of the next instruction in LR.

use std::collections::HashMap;

/// Value the caller leaves in LR; popping it into PC ends the run.
const RETURN_MARKER: u32 = 0xFFFF_FFF1;
/// Caller values in R4-R7 that the function has to hand back untouched.
const SENTINELS: [u32; 4] = [0x4444_0004, 0x5555_0005, 0x6666_0006, 0x7777_0007];
/// What `__aeabi_idiv` leaves behind in R1-R3.
const CLOBBER: u32 = 0xDEAD_0000;
const STEP_LIMIT: usize = 100_000;

struct Instr {
    mnemonic: String,
    operands: Vec<String>,
}

#[derive(Default)]
struct Cpu {
    regs: [u32; 16],
    n: bool,
    z: bool,
    c: bool,
    v: bool,
    stack: Vec<u32>,
}

fn reg_index(name: &str) -> Result<usize, String> {
    match name {
        "SP" => Ok(13),
        "LR" => Ok(14),
        "PC" => Ok(15),
        _ => name
            .strip_prefix('R')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n < 13)
            .ok_or_else(|| format!("bad register {}", name)),
    }
}

fn immediate(text: &str) -> Result<u32, String> {
    text.parse::<i64>()
        .map(|v| v as u32)
        .map_err(|e| format!("bad immediate {}: {}", text, e))
}

impl Cpu {
    fn read(&self, operand: &str) -> Result<u32, String> {
        match operand.strip_prefix('#') {
            Some(imm) => immediate(imm),
            None => Ok(self.regs[reg_index(operand)?]),
        }
    }

    fn write(&mut self, operand: &str, value: u32) -> Result<(), String> {
        self.regs[reg_index(operand)?] = value;
        Ok(())
    }

    fn set_nz(&mut self, value: u32) {
        self.n = value >> 31 == 1;
        self.z = value == 0;
    }

    fn add_with_carry(&mut self, a: u32, b: u32, carry: bool) -> u32 {
        let wide = a as u64 + b as u64 + carry as u64;
        let result = wide as u32;
        self.c = wide > u32::MAX as u64;
        self.v = ((a ^ result) & (b ^ result)) >> 31 == 1;
        self.set_nz(result);
        result
    }

    fn condition(&self, cond: &str) -> Result<bool, String> {
        Ok(match cond {
            "EQ" => self.z,
            "NE" => !self.z,
            "GT" => !self.z && self.n == self.v,
            "LT" => self.n != self.v,
            "GE" => self.n == self.v,
            "LE" => self.z || self.n != self.v,
            _ => return Err(format!("unknown condition {}", cond)),
        })
    }

    /// Source operands of a two- or three-operand data instruction.
    fn sources(&self, ops: &[String]) -> Result<(u32, u32), String> {
        match ops {
            [d, m] => Ok((self.read(d)?, self.read(m)?)),
            [_, n, m] => Ok((self.read(n)?, self.read(m)?)),
            _ => Err(format!("bad operands {:?}", ops)),
        }
    }
}

fn assemble(asm: &str) -> (Vec<Instr>, HashMap<String, usize>) {
    let mut program = Vec::new();
    let mut labels = HashMap::new();
    for line in asm.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(label) = line.strip_suffix(':') {
            labels.insert(label.to_string(), program.len());
            continue;
        }
        if line.starts_with('.') {
            continue;
        }
        let (mnemonic, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim().trim_start_matches('{').trim_end_matches('}');
        let operands = rest
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        program.push(Instr {
            mnemonic: mnemonic.to_string(),
            operands,
        });
    }
    (program, labels)
}

/// Call `function` with `args` in R0-R3 and return R0.
///
/// Fails when the code clobbers a callee-saved register, leaves the stack
/// unbalanced or uses an instruction outside the modelled subset.
pub fn run(asm: &str, function: &str, args: &[i32]) -> Result<i32, String> {
    let (program, labels) = assemble(asm);
    let mut cpu = Cpu::default();
    for (i, arg) in args.iter().enumerate() {
        cpu.regs[i] = *arg as u32;
    }
    for (i, sentinel) in SENTINELS.iter().enumerate() {
        cpu.regs[4 + i] = *sentinel;
    }
    cpu.regs[14] = RETURN_MARKER;

    let jump = |label: &str| {
        labels
            .get(label)
            .copied()
            .ok_or_else(|| format!("unknown label {}", label))
    };
    let mut pc = jump(function)?;

    for _ in 0..STEP_LIMIT {
        let instr = program.get(pc).ok_or("ran past the last instruction")?;
        pc += 1;
        let ops = instr.operands.as_slice();
        let mnemonic = instr.mnemonic.as_str();

        match mnemonic {
            "MOVS" => {
                let value = cpu.read(&ops[1])?;
                cpu.set_nz(value);
                cpu.write(&ops[0], value)?;
            }
            "LDR" => {
                let value = immediate(ops[1].trim_start_matches('='))?;
                cpu.write(&ops[0], value)?;
            }
            "ADDS" | "SUBS" | "ADCS" | "SBCS" => {
                let (a, b) = cpu.sources(ops)?;
                let result = match mnemonic {
                    "ADDS" => cpu.add_with_carry(a, b, false),
                    "SUBS" => cpu.add_with_carry(a, !b, true),
                    "ADCS" => cpu.add_with_carry(a, b, cpu.c),
                    _ => cpu.add_with_carry(a, !b, cpu.c),
                };
                cpu.write(&ops[0], result)?;
            }
            "NEGS" => {
                let m = cpu.read(&ops[1])?;
                let result = cpu.add_with_carry(0, !m, true);
                cpu.write(&ops[0], result)?;
            }
            "MULS" | "ANDS" | "ORRS" => {
                let (a, b) = cpu.sources(ops)?;
                let result = match mnemonic {
                    "MULS" => a.wrapping_mul(b),
                    "ANDS" => a & b,
                    _ => a | b,
                };
                cpu.set_nz(result);
                cpu.write(&ops[0], result)?;
            }
            "ASRS" | "LSRS" => {
                let m = cpu.read(&ops[1])?;
                let shift = cpu.read(&ops[2])?;
                let result = if mnemonic == "ASRS" {
                    ((m as i32) >> shift) as u32
                } else {
                    m >> shift
                };
                cpu.c = (m >> (shift - 1)) & 1 == 1;
                cpu.set_nz(result);
                cpu.write(&ops[0], result)?;
            }
            "CMP" => {
                let (a, b) = (cpu.read(&ops[0])?, cpu.read(&ops[1])?);
                cpu.add_with_carry(a, !b, true);
            }
            "B" => pc = jump(ops[0].as_str())?,
            "BEQ" | "BNE" | "BGT" | "BLT" | "BGE" | "BLE" => {
                if cpu.condition(&mnemonic[1..])? {
                    pc = jump(ops[0].as_str())?;
                }
            }
            "BL" if ops[0] == "__aeabi_idiv" => {
                let (n, d) = (cpu.regs[0] as i32, cpu.regs[1] as i32);
                cpu.regs[0] = if d == 0 { 0 } else { n.wrapping_div(d) as u32 };
                for r in 1..4 {
                    cpu.regs[r] = CLOBBER + r as u32;
                }
                cpu.regs[14] = CLOBBER;
            }
            "BL" => {
                cpu.regs[14] = pc as u32;
                pc = jump(ops[0].as_str())?;
            }
            "PUSH" => {
                for op in ops.iter().rev() {
                    let value = cpu.regs[reg_index(op)?];
                    cpu.stack.push(value);
                }
            }
            "POP" => {
                for op in ops {
                    let value = cpu.stack.pop().ok_or("stack underflow")?;
                    if op == "PC" {
                        if value == RETURN_MARKER {
                            return finish(&cpu);
                        }
                        if value as usize > program.len() {
                            return Err(format!("returned to {:#x}", value));
                        }
                        pc = value as usize;
                        break;
                    }
                    cpu.regs[reg_index(op)?] = value;
                }
            }
            other => return Err(format!("unsupported instruction {}", other)),
        }
    }
    Err("step limit reached".to_string())
}

fn finish(cpu: &Cpu) -> Result<i32, String> {
    if !cpu.stack.is_empty() {
        return Err(format!("{} words left on the stack", cpu.stack.len()));
    }
    if cpu.regs[4..8] != SENTINELS {
        return Err(format!("callee-saved registers clobbered: {:x?}", &cpu.regs[4..8]));
    }
    Ok(cpu.regs[0] as i32)
}

/// Registers named by the PUSH and POP that frame the function, without
/// LR and PC.
pub fn frame_registers(asm: &str) -> (Vec<String>, Vec<String>) {
    let (program, _) = assemble(asm);
    let list = |mnemonic: &str, extra: &str, from_end: bool| -> Vec<String> {
        let mut frames = program.iter().filter(|i| i.mnemonic == mnemonic);
        let instr = if from_end { frames.last() } else { frames.next() };
        instr
            .map(|i| i.operands.iter().filter(|o| *o != extra).cloned().collect())
            .unwrap_or_default()
    };
    (list("PUSH", "LR", false), list("POP", "PC", true))
}
