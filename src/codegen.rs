//! Code generator: one named function → Cortex-M0 Thumb assembly.
//!
//! Registers come from a fixed pool and are never handed back within a
//! function. Every instruction is appended to an [`Emitter`], which also
//! records the registers touched so the prologue and epilogue can save and
//! restore exactly the callee-saved ones in use.
//!
//! A register owned by a named variable is never handed out again, and a
//! new variable only settles in a register that no earlier instruction
//! used: code emitted before it may run again on a later loop iteration.
//! The one callable function is the one being compiled, so recursion works
//! and every other call is rejected.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use log::{debug, info, trace};
use snafu::{ensure, OptionExt};

use crate::ast::{BinOp, FunctionDef, Literal, Node};
use crate::environment::{EnvRef, Environment};
use crate::error::{
    ArgumentCountSnafu, CodegenResult, ImmediateRangeSnafu, NoEntryFunctionSnafu, NoValueSnafu, OutOfRegistersSnafu,
    UnboundNameSnafu, UnsupportedSnafu, ZeroDivisorSnafu,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register(pub u8);

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Allocation order of the general-purpose pool.
pub const GENERAL: [Register; 8] = [
    Register(0),
    Register(1),
    Register(2),
    Register(3),
    Register(4),
    Register(5),
    Register(6),
    Register(7),
];

/// Registers a callee must preserve, in push order.
pub const CALLEE_SAVED: [Register; 5] = [
    Register(4),
    Register(5),
    Register(6),
    Register(7),
    Register(8),
];

pub const RETURN: Register = Register(0);

/// Argument and scratch registers that `__aeabi_idiv` may clobber.
const CALLER_SAVED: [Register; 4] = [Register(0), Register(1), Register(2), Register(3)];

const MAX_PARAMS: usize = 4;

// ===== Pools =====

#[derive(Clone, Debug)]
pub struct RegisterPool {
    free: VecDeque<Register>,
}

impl Default for RegisterPool {
    fn default() -> Self {
        Self {
            free: GENERAL.into_iter().collect(),
        }
    }
}

impl RegisterPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> CodegenResult<Register> {
        self.free.pop_front().context(OutOfRegistersSnafu { needed: 1usize })
    }

    /// The `n`-th free register, left in the pool.
    pub fn peek(&self, n: usize) -> CodegenResult<Register> {
        self.free
            .get(n)
            .copied()
            .context(OutOfRegistersSnafu { needed: n + 1 })
    }

    /// The first free register accepted by `wanted`.
    pub fn take_where(&mut self, wanted: impl Fn(Register) -> bool) -> CodegenResult<Register> {
        let index = self
            .free
            .iter()
            .position(|r| wanted(*r))
            .context(OutOfRegistersSnafu { needed: 1usize })?;
        self.free
            .remove(index)
            .context(OutOfRegistersSnafu { needed: 1usize })
    }

    /// This pool minus the `owned` registers.
    pub fn without(&self, owned: &BTreeSet<Register>) -> Self {
        Self {
            free: self.free.iter().copied().filter(|r| !owned.contains(r)).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.free.len()
    }
}

/// Branch targets `.L2`, `.L4`, ...
#[derive(Debug)]
pub struct LabelPool {
    next: u32,
}

impl Default for LabelPool {
    fn default() -> Self {
        Self { next: 2 }
    }
}

impl LabelPool {
    pub fn next(&mut self) -> String {
        let label = format!(".L{}", self.next);
        self.next += 2;
        label
    }
}

// ===== Output buffer =====

#[derive(Debug, Default)]
pub struct Emitter {
    lines: Vec<String>,
    touched: BTreeSet<Register>,
}

impl Emitter {
    pub fn instr(&mut self, mnemonic: &str, operands: impl fmt::Display) {
        self.lines.push(format!("\t{:<4}\t{}", mnemonic, operands));
    }

    pub fn label(&mut self, label: &str) {
        self.lines.push(format!("{}:", label));
    }

    pub fn touch(&mut self, register: Register) {
        self.touched.insert(register);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Callee-saved registers up to the highest one touched.
    pub fn saved_registers(&self) -> Vec<Register> {
        match CALLEE_SAVED.iter().rev().find(|r| self.touched.contains(*r)) {
            Some(highest) => CALLEE_SAVED.into_iter().filter(|r| r <= highest).collect(),
            None => Vec::new(),
        }
    }
}

/// `{ R4, R5, LR }`
fn register_list(registers: &[Register], last: &str) -> String {
    let mut names: Vec<String> = registers.iter().map(Register::to_string).collect();
    if !last.is_empty() {
        names.push(last.to_string());
    }
    format!("{{ {} }}", names.join(", "))
}

// ===== Operands =====

/// Compile-time view of a number: where it lives and, when it is known
/// statically, its value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Operand {
    pub value: Option<i64>,
    pub register: Register,
    /// A named variable owns the register; it must not be overwritten.
    pub bound: bool,
}

impl Operand {
    fn temp(register: Register, value: Option<i64>) -> Self {
        Self {
            value,
            register,
            bound: false,
        }
    }
}

/// Bookkeeping value of `a op b` when both sides are known.
fn fold(a: Option<i64>, op: BinOp, b: Option<i64>) -> Option<i64> {
    let (a, b) = (a?, b?);
    let truth = |t: bool| Some(i64::from(t));
    match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => a.checked_div(b),
        BinOp::Eq => truth(a == b),
        BinOp::Ne => truth(a != b),
        BinOp::Gt => truth(a > b),
        BinOp::Ge => truth(a >= b),
        BinOp::Lt => truth(a < b),
        BinOp::Le => truth(a <= b),
        BinOp::And => truth(a != 0 && b != 0),
        BinOp::Or => truth(a != 0 || b != 0),
    }
}

// ===== Generator =====

pub struct Codegen {
    name: String,
    arity: usize,
    registers: RegisterPool,
    labels: LabelPool,
    out: Emitter,
    exit_label: String,
    /// How often each register was handed out, as a value or as scratch.
    issued: BTreeMap<Register, usize>,
    /// Registers owned by named variables.
    pinned: BTreeSet<Register>,
}

/// Compile a named function definition to a complete assembly file.
pub fn generate(def: &FunctionDef) -> CodegenResult<String> {
    let name = def.name.as_deref().context(NoEntryFunctionSnafu)?;
    ensure!(
        def.params.len() <= MAX_PARAMS,
        UnsupportedSnafu {
            construct: "more than four parameters",
        }
    );
    info!("compiling fn {} ({} parameter(s))", name, def.params.len());

    let mut codegen = Codegen::new(name, def.params.len());
    let env = Environment::<Operand>::root();
    for param in &def.params {
        let register = codegen.fresh()?;
        codegen.pinned.insert(register);
        trace!("parameter {} in {}", param, register);
        env.borrow_mut().define(param.as_str(), Operand {
            value: None,
            register,
            bound: true,
        });
    }

    if let Some(result) = codegen.visit(&def.body, &env)? {
        codegen.mov(RETURN, result.register);
    }
    Ok(codegen.finish(name))
}

impl Codegen {
    pub fn new(name: &str, arity: usize) -> Self {
        Self {
            name: name.to_string(),
            arity,
            registers: RegisterPool::new(),
            labels: LabelPool::default(),
            out: Emitter::default(),
            exit_label: format!("{}_end", name),
            issued: BTreeMap::new(),
            pinned: BTreeSet::new(),
        }
    }

    fn issue(&mut self, register: Register) -> Register {
        self.out.touch(register);
        *self.issued.entry(register).or_default() += 1;
        register
    }

    /// Take a register for a new value.
    fn fresh(&mut self) -> CodegenResult<Register> {
        let register = self.registers.take()?;
        Ok(self.issue(register))
    }

    /// Borrow a free register for the length of one template.
    fn scratch(&mut self, n: usize) -> CodegenResult<Register> {
        let register = self.registers.peek(n)?;
        Ok(self.issue(register))
    }

    /// Take a register that no instruction so far has used.
    fn unused(&mut self) -> CodegenResult<Register> {
        let issued = &self.issued;
        let register = self.registers.take_where(|r| !issued.contains_key(&r))?;
        Ok(self.issue(register))
    }

    fn mov(&mut self, to: Register, from: Register) {
        if to != from {
            self.out.instr("MOVS", format_args!("{}, {}", to, from));
        }
    }

    fn load_immediate(&mut self, register: Register, value: i64) -> CodegenResult<()> {
        if (0..=255).contains(&value) {
            self.out.instr("MOVS", format_args!("{}, #{}", register, value));
        } else {
            ensure!(i32::try_from(value).is_ok(), ImmediateRangeSnafu { value });
            self.out.instr("LDR", format_args!("{}, ={}", register, value));
        }
        Ok(())
    }

    pub fn visit(&mut self, node: &Node, env: &EnvRef<Operand>) -> CodegenResult<Option<Operand>> {
        match node {
            Node::Number(Literal::Int(value)) => {
                let register = self.fresh()?;
                self.load_immediate(register, *value)?;
                Ok(Some(Operand::temp(register, Some(*value))))
            }
            Node::Number(Literal::Float(_)) => UnsupportedSnafu {
                construct: "float literals",
            }
            .fail(),

            Node::VarAccess(name) => env
                .borrow()
                .get(name)
                .map(Some)
                .context(UnboundNameSnafu { name: name.as_str() }),

            Node::VarAssign { name, value } => {
                let value = self.value_of(value, env)?;
                let operand = self.assign(name, value, env)?;
                Ok(Some(operand))
            }

            Node::BinaryOp { left, op, right } => {
                let left = self.value_of(left, env)?;
                let right = self.value_of(right, env)?;
                self.binary(left, *op, right).map(Some)
            }

            Node::Block(statements) => {
                let mut last = None;
                let mut returned = false;
                for statement in statements {
                    last = self.visit(statement, env)?;
                    returned |= statement.is_return();
                }
                Ok(if returned { None } else { last })
            }

            Node::If { cases, else_body } => self.conditional(cases, else_body.as_deref(), env),

            Node::While { condition, body } => {
                let start = self.labels.next();
                let end = self.labels.next();
                self.out.label(&start);
                let condition = self.value_of(condition, env)?;
                self.out.instr("CMP", format_args!("{}, #0", condition.register));
                self.out.instr("BEQ", &end);
                self.visit(body, env)?;
                self.out.instr("B", &start);
                self.out.label(&end);
                Ok(None)
            }

            Node::Return(value) => {
                if let Some(value) = value {
                    let value = self.value_of(value, env)?;
                    self.mov(RETURN, value.register);
                }
                let exit = self.exit_label.clone();
                self.out.instr("B", exit);
                Ok(None)
            }

            Node::FunctionDef(_) => UnsupportedSnafu {
                construct: "nested function definitions",
            }
            .fail(),
            Node::Call { callee, args } => self.call(callee, args, env).map(Some),
        }
    }

    /// Visit a node that has to leave a number in a register.
    fn value_of(&mut self, node: &Node, env: &EnvRef<Operand>) -> CodegenResult<Operand> {
        self.visit(node, env)?.context(NoValueSnafu {
            construct: node.describe(),
        })
    }

    fn assign(&mut self, name: &str, value: Operand, env: &EnvRef<Operand>) -> CodegenResult<Operand> {
        let existing = env.borrow().get_local(name);
        let operand = match existing {
            // Reassignment may sit on one path only, so the value is no
            // longer known.
            Some(existing) => {
                self.mov(existing.register, value.register);
                Operand {
                    value: None,
                    ..existing
                }
            }
            // A temp handed out only once can become the variable; an alias
            // or a register that earlier code also wrote gets a clean copy.
            None => {
                let register = if value.bound || self.issued.get(&value.register) != Some(&1) {
                    let register = self.unused()?;
                    self.mov(register, value.register);
                    register
                } else {
                    value.register
                };
                self.pinned.insert(register);
                Operand {
                    value: value.value,
                    register,
                    bound: true,
                }
            }
        };
        trace!("{} lives in {}", name, operand.register);
        env.borrow_mut().define(name, operand);
        Ok(operand)
    }

    fn binary(&mut self, a: Operand, op: BinOp, b: Operand) -> CodegenResult<Operand> {
        debug!("lowering {} {} {}", a.register, op.spelling(), b.register);
        let value = fold(a.value, op, b.value);
        let (ra, rb) = (a.register, b.register);

        let register = match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul => {
                let target = if a.bound {
                    let copy = self.fresh()?;
                    self.mov(copy, ra);
                    copy
                } else {
                    ra
                };
                let mnemonic = match op {
                    BinOp::Add => "ADDS",
                    BinOp::Sub => "SUBS",
                    _ => "MULS",
                };
                self.out.instr(mnemonic, format_args!("{}, {}", target, rb));
                target
            }

            BinOp::Div => return self.divide(a, b),

            BinOp::Eq => {
                let r = self.fresh()?;
                let t = self.scratch(0)?;
                self.out.instr("SUBS", format_args!("{}, {}, {}", t, rb, ra));
                self.out.instr("NEGS", format_args!("{}, {}", r, t));
                self.out.instr("ADCS", format_args!("{}, {}, {}", r, r, t));
                r
            }

            BinOp::Ne => {
                let r = self.fresh()?;
                let t = self.scratch(0)?;
                self.out.instr("SUBS", format_args!("{}, {}, {}", r, rb, ra));
                self.out.instr("SUBS", format_args!("{}, {}, #1", t, r));
                self.out.instr("SBCS", format_args!("{}, {}, {}", r, r, t));
                r
            }

            BinOp::Gt | BinOp::Lt => {
                let r = self.fresh()?;
                let skip = self.labels.next();
                let branch = if op == BinOp::Gt { "BGT" } else { "BLT" };
                self.out.instr("MOVS", format_args!("{}, #1", r));
                self.out.instr("CMP", format_args!("{}, {}", ra, rb));
                self.out.instr(branch, &skip);
                self.out.instr("MOVS", format_args!("{}, #0", r));
                self.out.label(&skip);
                r
            }

            // Sign bits fix up the unsigned carry from CMP.
            BinOp::Ge => {
                let r = self.fresh()?;
                let t = self.scratch(0)?;
                self.out.instr("ASRS", format_args!("{}, {}, #31", r, ra));
                self.out.instr("LSRS", format_args!("{}, {}, #31", t, rb));
                self.out.instr("CMP", format_args!("{}, {}", ra, rb));
                self.out.instr("ADCS", format_args!("{}, {}, {}", r, r, t));
                r
            }

            BinOp::Le => {
                let r = self.fresh()?;
                let t = self.scratch(0)?;
                self.out.instr("LSRS", format_args!("{}, {}, #31", r, ra));
                self.out.instr("ASRS", format_args!("{}, {}, #31", t, rb));
                self.out.instr("CMP", format_args!("{}, {}", rb, ra));
                self.out.instr("ADCS", format_args!("{}, {}, {}", r, r, t));
                r
            }

            BinOp::And | BinOp::Or => {
                let r = self.fresh()?;
                let s = self.scratch(0)?;
                let t = self.scratch(1)?;
                self.normalize(r, ra, t);
                self.normalize(s, rb, t);
                let mnemonic = if op == BinOp::And { "ANDS" } else { "ORRS" };
                self.out.instr(mnemonic, format_args!("{}, {}", r, s));
                r
            }
        };

        Ok(Operand::temp(register, value))
    }

    /// `dest = (src != 0)`, clobbering `scratch`.
    fn normalize(&mut self, dest: Register, src: Register, scratch: Register) {
        self.out.instr("MOVS", format_args!("{}, {}", dest, src));
        self.out.instr("SUBS", format_args!("{}, {}, #1", scratch, src));
        self.out.instr("SBCS", format_args!("{}, {}, {}", dest, dest, scratch));
    }

    /// Signed division through the EABI helper, which takes R0 / R1 and
    /// may clobber R0-R3.
    fn divide(&mut self, a: Operand, b: Operand) -> CodegenResult<Operand> {
        ensure!(b.value != Some(0), ZeroDivisorSnafu);
        let value = fold(a.value, BinOp::Div, b.value);
        let result = self.fresh()?;
        let saved: Vec<Register> = CALLER_SAVED.into_iter().filter(|r| *r != result).collect();
        let (ra, rb) = (a.register, b.register);
        let (r0, r1) = (Register(0), Register(1));

        self.out.instr("PUSH", register_list(&saved, ""));
        if ra == r1 && rb == r0 {
            self.mov(result, ra);
            self.mov(r1, rb);
            self.mov(r0, result);
        } else if rb == r0 {
            self.mov(r1, rb);
            self.mov(r0, ra);
        } else {
            self.mov(r0, ra);
            self.mov(r1, rb);
        }
        self.out.instr("BL", "__aeabi_idiv");
        self.mov(result, r0);
        self.out.instr("POP", register_list(&saved, ""));

        Ok(Operand::temp(result, value))
    }

    /// `BL` to the function being compiled. Arguments travel in R0-R3 and
    /// the caller-saved registers are kept on the stack around the call.
    fn call(&mut self, callee: &Node, args: &[Node], env: &EnvRef<Operand>) -> CodegenResult<Operand> {
        let target = match callee {
            Node::VarAccess(name) if *name == self.name && env.borrow().get(name).is_none() => {
                name.clone()
            }
            _ => {
                return UnsupportedSnafu {
                    construct: "calls to anything but the function being compiled",
                }
                .fail()
            }
        };
        ensure!(
            args.len() == self.arity,
            ArgumentCountSnafu {
                function: target.as_str(),
                expected: self.arity,
                got: args.len(),
            }
        );

        let mut sources = Vec::with_capacity(args.len());
        for arg in args {
            sources.push(self.value_of(arg, env)?.register);
        }
        let result = self.fresh()?;
        let saved: Vec<Register> = CALLER_SAVED.into_iter().filter(|r| *r != result).collect();
        debug!("call {} with {}", target, register_list(&sources, ""));

        self.out.instr("PUSH", register_list(&saved, ""));
        let moves = CALLER_SAVED.into_iter().zip(sources).collect();
        self.parallel_move(moves, result);
        self.out.instr("BL", &target);
        self.mov(result, RETURN);
        self.out.instr("POP", register_list(&saved, ""));

        Ok(Operand::temp(result, None))
    }

    /// Perform every `(to, from)` move as if at once. Cycles are broken
    /// through `spare`, which must not appear in any move.
    fn parallel_move(&mut self, mut moves: Vec<(Register, Register)>, spare: Register) {
        moves.retain(|(to, from)| to != from);
        while !moves.is_empty() {
            let ready = moves
                .iter()
                .position(|(to, _)| !moves.iter().any(|(_, from)| from == to));
            match ready {
                Some(i) => {
                    let (to, from) = moves.remove(i);
                    self.mov(to, from);
                }
                None => {
                    let (blocked, _) = moves[0];
                    self.mov(spare, blocked);
                    for (_, from) in moves.iter_mut() {
                        if *from == blocked {
                            *from = spare;
                        }
                    }
                }
            }
        }
    }

    /// Every case and the else body share one result register. The pool
    /// is rewound before each path that the previous one skipped, and the
    /// most consumed pool survives. Registers of variables bound on any
    /// path stay out of the pool.
    fn conditional(
        &mut self,
        cases: &[(Node, Node)],
        else_body: Option<&Node>,
        env: &EnvRef<Operand>,
    ) -> CodegenResult<Option<Operand>> {
        let result = self.fresh()?;
        let after = self.labels.next();
        self.out.instr("MOVS", format_args!("{}, #0", result));

        let start = self.registers.clone();
        let mut deepest: Option<RegisterPool> = None;

        for (condition, body) in cases {
            let next = self.labels.next();
            let condition = self.value_of(condition, env)?;
            self.out.instr("CMP", format_args!("{}, #0", condition.register));
            self.out.instr("BEQ", &next);
            if let Some(value) = self.visit(body, env)? {
                self.mov(result, value.register);
            }
            self.out.instr("B", &after);
            self.out.label(&next);
            self.rewind(&start, &mut deepest);
        }

        if let Some(body) = else_body {
            if let Some(value) = self.visit(body, env)? {
                self.mov(result, value.register);
            }
            self.rewind(&start, &mut deepest);
        }

        self.out.label(&after);
        if let Some(pool) = deepest {
            self.registers = pool.without(&self.pinned);
        }
        Ok(Some(Operand::temp(result, None)))
    }

    fn rewind(&mut self, start: &RegisterPool, deepest: &mut Option<RegisterPool>) {
        let current = std::mem::replace(&mut self.registers, start.without(&self.pinned));
        let keep = match deepest {
            Some(pool) => current.remaining() < pool.remaining(),
            None => true,
        };
        if keep {
            *deepest = Some(current);
        }
    }

    /// Wrap the body in the file header, prologue and epilogue.
    pub fn finish(self, name: &str) -> String {
        let saved = self.out.saved_registers();
        debug!("fn {} saves {}", name, register_list(&saved, ""));

        let mut text = String::new();
        for directive in [".cpu cortex-m0", ".syntax unified", ".thumb", ".text", ".align 2"] {
            text.push_str(directive);
            text.push('\n');
        }
        text.push_str(&format!(".global {}\n\n", name));
        text.push_str(".thumb_func\n");
        text.push_str(&format!("{}:\n", name));
        text.push_str(&format!("\tPUSH\t{}\n", register_list(&saved, "LR")));
        for line in self.out.lines() {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str(&format!("{}:\n", self.exit_label));
        text.push_str(&format!("\tPOP \t{}\n", register_list(&saved, "PC")));
        text
    }
}
