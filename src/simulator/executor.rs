//! Deals with how instructions are executed

use super::register_names::Register;
use super::{ConditionCodes, State, Status};
use crate::codec::sign_bit;
use crate::instruction::{AluOp, Fetch, Instruction};
use tracing::{debug, info, trace, warn};

/// How a call to [`State::run`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The program reached a terminal status
    Finished(Status),
    /// The step budget ran out while the program was still running
    StepLimitExceeded { steps: u64 },
}

/// What the executor does after an instruction
enum Flow {
    /// Move past the instruction
    Advance,
    /// Continue at an address that was already validated
    Jump(i32),
    /// Stop the run with a terminal status, leaving the pc where it is
    Stop(Status),
}

impl State {
    /// Runs the program in memory from address 0 until it reaches a terminal status.
    ///
    /// Registers, flags and memory are kept as they are, so a loader or a previous run may
    /// set them up, but the status, pc and step counter start over. With `max_steps`, at most
    /// that many fetch cycles are attempted; without it, a program that never halts never
    /// returns.
    pub fn run(&mut self, max_steps: Option<u64>) -> RunOutcome {
        self.status = Status::Running;
        self.pc = 0;
        self.steps = 0;

        debug!(memory_size = self.memory.len(), ?max_steps, "starting run");

        while self.status == Status::Running {
            if let Some(limit) = max_steps {
                if self.steps >= limit {
                    warn!(steps = self.steps, pc = self.pc, "step limit exceeded");
                    return RunOutcome::StepLimitExceeded { steps: self.steps };
                }
            }
            self.step();
        }

        match self.status {
            Status::Halted => info!(steps = self.steps, pc = self.pc, "program halted"),
            status => warn!(steps = self.steps, pc = self.pc, %status, "program stopped"),
        }

        RunOutcome::Finished(self.status)
    }

    /// Performs a single fetch-decode-execute cycle and returns the resulting status.
    /// Does nothing once the status is terminal.
    pub fn step(&mut self) -> Status {
        if self.status.is_terminal() {
            return self.status;
        }

        let Some(window) = self.memory.fetch(self.pc as i64) else {
            debug!(pc = self.pc, "instruction fetch out of bounds");
            self.status = Status::AddressError;
            return self.status;
        };

        self.steps += 1;

        let instr = match Instruction::decode(&Fetch::from_window(&window)) {
            Ok(instr) => instr,
            Err(e) => {
                debug!(pc = self.pc, error = %e, "invalid instruction");
                self.status = Status::InvalidInstruction;
                return self.status;
            }
        };

        trace!(pc = format_args!("{:#06x}", self.pc), step = self.steps, "{instr}");

        match self.execute(instr) {
            Flow::Advance => self.pc = self.pc.wrapping_add(instr.len() as i32),
            Flow::Jump(target) => self.pc = target,
            Flow::Stop(status) => self.status = status,
        }

        self.status
    }

    /// Every check an instruction needs happens before it changes anything, so a faulting
    /// instruction leaves no partial effects behind.
    fn execute(&mut self, instr: Instruction) -> Flow {
        use Instruction::*;

        match instr {
            Halt => Flow::Stop(Status::Halted),
            Nop => Flow::Advance,

            Move(cond, ra, rb) => {
                if cond.holds(self.codes) {
                    self.set_reg(rb, self.register(ra));
                }
                Flow::Advance
            }
            Irmovl(rb, imm) => {
                self.set_reg(rb, imm as i32);
                Flow::Advance
            }
            Rmmovl(ra, rb, disp) => {
                let addr = self.effective_address(rb, disp);
                let x = self.register(ra) as u32;
                match self.memory.set_word(addr, x) {
                    Some(()) => Flow::Advance,
                    None => Flow::Stop(Status::AddressError),
                }
            }
            Mrmovl(ra, rb, disp) => {
                let addr = self.effective_address(rb, disp);
                match self.memory.get_word(addr) {
                    Some(x) => {
                        self.set_reg(ra, x as i32);
                        Flow::Advance
                    }
                    None => Flow::Stop(Status::AddressError),
                }
            }

            Op(op, ra, rb) => {
                let result = self.alu(op, self.register(rb), self.register(ra));
                self.set_reg(rb, result);
                Flow::Advance
            }
            IOp(op, rb, imm) => {
                let result = self.alu(op, self.register(rb), imm as i32);
                self.set_reg(rb, result);
                Flow::Advance
            }

            Jump(cond, dest) => {
                if !cond.holds(self.codes) {
                    Flow::Advance
                } else {
                    self.jump_to(dest as i32)
                }
            }
            Call(dest) => {
                let dest = dest as i32;
                if !self.memory.can_fetch(dest as i64) {
                    return Flow::Stop(Status::AddressError);
                }
                match self.push(self.pc.wrapping_add(instr.len() as i32)) {
                    Some(()) => Flow::Jump(dest),
                    None => Flow::Stop(Status::AddressError),
                }
            }
            Ret => match self.peek() {
                Some(target) if self.memory.can_fetch(target as i64) => {
                    self.drop_top();
                    Flow::Jump(target)
                }
                _ => Flow::Stop(Status::AddressError),
            },

            Push(ra) => match self.push(self.register(ra)) {
                Some(()) => Flow::Advance,
                None => Flow::Stop(Status::AddressError),
            },
            Pop(ra) => match self.pop() {
                Some(x) => {
                    // after `esp += 4`, so that `popl %esp` loads the popped value
                    self.set_reg(ra, x);
                    Flow::Advance
                }
                None => Flow::Stop(Status::AddressError),
            },
        }
    }

    fn jump_to(&self, dest: i32) -> Flow {
        if self.memory.can_fetch(dest as i64) {
            Flow::Jump(dest)
        } else {
            Flow::Stop(Status::AddressError)
        }
    }

    /// `reg[base] + displacement`, with 32-bit wraparound
    fn effective_address(&self, base: Register, disp: u32) -> i64 {
        self.register(base).wrapping_add(disp as i32) as i64
    }

    /// Computes `b op a` and sets the condition codes.
    /// The overflow flag only looks at the sign of `b` and of the result; this is the
    /// machine's documented behavior, not two's complement overflow.
    fn alu(&mut self, op: AluOp, b: i32, a: i32) -> i32 {
        let (b, a) = (b as u32, a as u32);

        let result = match op {
            AluOp::Add => b.wrapping_add(a),
            AluOp::Sub => b.wrapping_sub(a),
            AluOp::And => b & a,
            AluOp::Xor => b ^ a,
        };

        let of = match op {
            AluOp::Add => sign_bit(b) && !sign_bit(result),
            AluOp::Sub => !sign_bit(b) && sign_bit(result),
            AluOp::And | AluOp::Xor => false,
        };

        self.codes = ConditionCodes {
            zf: result == 0,
            sf: sign_bit(result),
            of,
        };

        result as i32
    }

    /// Pushes `x` onto the stack. Requires `4 <= esp < memory_size`.
    pub(crate) fn push(&mut self, x: i32) -> Option<()> {
        let esp = self.register(Register::Esp) as i64;
        if esp < 4 || esp >= self.memory.len() as i64 {
            return None;
        }

        let top = esp - 4;
        self.memory.set_word(top, x as u32)?;
        self.set_reg(Register::Esp, top as i32);
        Some(())
    }

    /// Value on top of the stack. Requires `0 <= esp < memory_size - 4`.
    fn peek(&self) -> Option<i32> {
        let esp = self.register(Register::Esp) as i64;
        if esp < 0 || esp >= self.memory.len() as i64 - 4 {
            return None;
        }

        self.memory.get_word(esp).map(|x| x as i32)
    }

    fn drop_top(&mut self) {
        let esp = self.register(Register::Esp);
        self.set_reg(Register::Esp, esp.wrapping_add(4));
    }

    pub(crate) fn pop(&mut self) -> Option<i32> {
        let x = self.peek()?;
        self.drop_top();
        Some(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{AluOp, Condition};
    use crate::loader::Image;
    use proptest::prelude::*;
    use Instruction::*;
    use Register::*;

    fn assemble(program: &[Instruction]) -> Vec<u8> {
        program.iter().flat_map(Instruction::encode).collect()
    }

    fn state_with(bytes: &[u8], memory_size: usize) -> State {
        let mut state = State::new();
        state.allocate(memory_size).expect("memory should be allocated");
        state.load(&Image::from_bytes(bytes)).expect("program fits in memory");
        state
    }

    fn run(program: &[Instruction]) -> State {
        let mut state = state_with(&assemble(program), 256);
        state.run(Some(1000));
        state
    }

    #[test]
    fn test_halt() {
        let mut state = state_with(&[0x00], 6);
        assert_eq!(state.run(None), RunOutcome::Finished(Status::Halted));
        assert_eq!(state.steps(), 1);
        assert_eq!(state.pc(), 0);
    }

    #[test]
    fn test_invalid_opcode() {
        let mut state = state_with(&[0xd0], 64);
        assert_eq!(state.run(None), RunOutcome::Finished(Status::InvalidInstruction));
        assert_eq!(state.steps(), 1);
        assert_eq!(state.pc(), 0);
        assert_eq!(state.registers(), &[0; 8]);
        assert_eq!(state.codes(), ConditionCodes::default());
    }

    #[test]
    fn test_memory_too_small_to_fetch() {
        let mut state = state_with(&[0x00], 5);
        assert_eq!(state.run(None), RunOutcome::Finished(Status::AddressError));
        assert_eq!(state.steps(), 0);
    }

    #[test]
    fn test_fetch_boundary() {
        // a nop at the last fetchable address, then the pc runs past the bound
        let mut bytes = vec![0x10; 16];
        bytes[15] = 0x00;
        let mut state = state_with(&bytes, 16);
        assert_eq!(state.run(None), RunOutcome::Finished(Status::AddressError));
        // nops at 0..=10 were fetched, pc = 11 = 16 - 5 is out of bounds
        assert_eq!(state.steps(), 11);
        assert_eq!(state.pc(), 11);
    }

    #[test]
    fn test_arithmetic_scenario() {
        let mut state = state_with(crate::loader::demo::ARITHMETIC, 1024);
        assert_eq!(state.run(None), RunOutcome::Finished(Status::Halted));
        assert_eq!(state.register(Eax), 5);
        assert_eq!(state.register(Ecx), 8);
        assert_eq!(state.codes(), ConditionCodes::default());
        assert_eq!(state.steps(), 4);
        assert_eq!(state.pc(), 14);
    }

    #[test]
    fn test_run_resets_pc_status_and_steps() {
        let mut state = state_with(crate::loader::demo::ARITHMETIC, 64);
        state.run(None);
        assert_eq!(state.register(Ecx), 8);
        state.run(None);
        assert_eq!(state.status(), Status::Halted);
        assert_eq!(state.steps(), 4);
        // registers survive between runs
        assert_eq!(state.register(Ecx), 8);
    }

    #[test]
    fn test_flags() {
        let state = run(&[Irmovl(Eax, 3), Irmovl(Ebx, 3), Op(AluOp::Sub, Eax, Ebx), Halt]);
        assert_eq!(state.register(Ebx), 0);
        assert_eq!(state.codes(), ConditionCodes { zf: true, sf: false, of: false });

        // 0 - 1: the sign of the result flips while rB was positive
        let state = run(&[Irmovl(Eax, 1), Op(AluOp::Sub, Eax, Ebx), Halt]);
        assert_eq!(state.register(Ebx), -1);
        assert_eq!(state.codes(), ConditionCodes { zf: false, sf: true, of: true });

        // -1 + 2 = 1: rB was negative and the result isn't
        let state = run(&[
            Irmovl(Eax, 2),
            Irmovl(Ebx, -1i32 as u32),
            Op(AluOp::Add, Eax, Ebx),
            Halt,
        ]);
        assert_eq!(state.register(Ebx), 1);
        assert_eq!(state.codes(), ConditionCodes { zf: false, sf: false, of: true });

        // i32::MAX + 1 wraps, but rB was positive so no overflow is reported
        let state = run(&[
            Irmovl(Ebx, i32::MAX as u32),
            IOp(AluOp::Add, Ebx, 1),
            Halt,
        ]);
        assert_eq!(state.register(Ebx), i32::MIN);
        assert_eq!(state.codes(), ConditionCodes { zf: false, sf: true, of: false });

        let state = run(&[
            Irmovl(Eax, 0xf0),
            IOp(AluOp::And, Eax, 0x0f),
            Halt,
        ]);
        assert_eq!(state.codes(), ConditionCodes { zf: true, sf: false, of: false });

        let state = run(&[Irmovl(Esi, 0x8000_0000), IOp(AluOp::Xor, Esi, 1), Halt]);
        assert_eq!(state.register(Esi), 0x8000_0001u32 as i32);
        assert_eq!(state.codes(), ConditionCodes { zf: false, sf: true, of: false });
    }

    #[test]
    fn test_non_arithmetic_keeps_flags() {
        let state = run(&[
            Irmovl(Eax, 0),
            IOp(AluOp::Add, Eax, 0),
            Irmovl(Ecx, 5),
            Move(Condition::Always, Ecx, Edx),
            Nop,
            Halt,
        ]);
        assert!(state.codes().zf);
        assert_eq!(state.register(Edx), 5);
    }

    #[test]
    fn test_conditional_move() {
        let state = run(&[
            Irmovl(Eax, 7),
            Irmovl(Ecx, 1),
            IOp(AluOp::Sub, Ecx, 1),
            Move(Condition::Eq, Eax, Ebx),
            Move(Condition::Ne, Eax, Esi),
            Halt,
        ]);
        assert_eq!(state.register(Ebx), 7);
        assert_eq!(state.register(Esi), 0);
    }

    #[test]
    fn test_memory_instructions() {
        let state = run(&[
            Irmovl(Eax, 0x12345678),
            Irmovl(Ebx, 0x80),
            Rmmovl(Eax, Ebx, 8),
            Mrmovl(Ecx, Ebx, 8),
            Halt,
        ]);
        assert_eq!(state.status(), Status::Halted);
        assert_eq!(state.register(Ecx), 0x12345678);
        assert_eq!(&state.memory().bytes()[0x88..0x8c], &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_store_bounds() {
        // last valid word is at 252 in 256 bytes of memory
        let state = run(&[Irmovl(Ebx, 252), Rmmovl(Ebx, Ebx, 0), Halt]);
        assert_eq!(state.status(), Status::Halted);

        let state = run(&[Irmovl(Ebx, 250), Rmmovl(Ebx, Ebx, 3), Halt]);
        assert_eq!(state.status(), Status::AddressError);
        assert_eq!(state.pc(), 6);
        assert_eq!(state.steps(), 2);

        let state = run(&[Irmovl(Ebx, 4), Mrmovl(Eax, Ebx, -5i32 as u32), Halt]);
        assert_eq!(state.status(), Status::AddressError);
        assert_eq!(state.register(Eax), 0);
    }

    #[test]
    fn test_jumps() {
        // 0: irmovl $1, %eax   6: jmp 0x11   11: halt   12: ...
        let mut program = assemble(&[Irmovl(Eax, 1), Jump(Condition::Always, 0x11), Halt]);
        program.resize(0x11, 0x10);
        program.extend(assemble(&[Irmovl(Ebx, 2), Halt]));

        let mut state = state_with(&program, 64);
        assert_eq!(state.run(None), RunOutcome::Finished(Status::Halted));
        assert_eq!(state.register(Ebx), 2);
        assert_eq!(state.pc(), 0x17);
        assert_eq!(state.steps(), 4);
    }

    #[test]
    fn test_branch_not_taken() {
        let state = run(&[
            IOp(AluOp::Add, Eax, 1),
            Jump(Condition::Le, 0xffff),
            Halt,
        ]);
        assert_eq!(state.status(), Status::Halted);
        assert_eq!(state.pc(), 11);
    }

    #[test]
    fn test_jump_out_of_bounds() {
        let state = run(&[Jump(Condition::Always, 251), Halt]);
        assert_eq!(state.status(), Status::AddressError);
        assert_eq!(state.pc(), 0);

        // 250 = 256 - 6 is the last fetchable address, and it holds a zero byte (halt)
        let state = run(&[Jump(Condition::Always, 250), Halt]);
        assert_eq!(state.status(), Status::Halted);
        assert_eq!(state.pc(), 250);
    }

    #[test]
    fn test_call_and_ret() {
        // 0: irmovl $0x80, %esp   6: call 0x20   11: halt
        // 0x20: irmovl $9, %eax   0x26: ret
        let mut program = assemble(&[Irmovl(Esp, 0x80), Call(0x20), Halt]);
        program.resize(0x20, 0x10);
        program.extend(assemble(&[Irmovl(Eax, 9), Ret]));

        let mut state = state_with(&program, 256);
        assert_eq!(state.run(None), RunOutcome::Finished(Status::Halted));
        assert_eq!(state.register(Eax), 9);
        assert_eq!(state.pc(), 11);
        assert_eq!(state.register(Esp), 0x80);
        // the return address is still in memory below the stack pointer
        assert_eq!(state.memory().get_word(0x7c), Some(11));
    }

    #[test]
    fn test_call_without_stack() {
        // esp = 0 can't be pushed to
        let state = run(&[Call(0x10), Halt]);
        assert_eq!(state.status(), Status::AddressError);
        assert_eq!(state.pc(), 0);
        assert_eq!(state.register(Esp), 0);
    }

    #[test]
    fn test_call_to_invalid_address() {
        // the stack is usable, but the target isn't
        let state = run(&[Irmovl(Esp, 0x80), Call(0x1000)]);
        assert_eq!(state.status(), Status::AddressError);
        assert_eq!(state.pc(), 6);
        assert_eq!(state.register(Esp), 0x80);
        // no return address was pushed
        assert_eq!(state.memory().get_word(0x7c), Some(0));
    }

    #[test]
    fn test_ret_to_invalid_address() {
        let state = run(&[
            Irmovl(Esp, 0x80),
            Irmovl(Eax, -1i32 as u32),
            Push(Eax),
            Ret,
        ]);
        assert_eq!(state.status(), Status::AddressError);
        assert_eq!(state.pc(), 14);
        // the faulting ret didn't pop anything
        assert_eq!(state.register(Esp), 0x7c);
    }

    #[test]
    fn test_push_and_pop() {
        let state = run(&[
            Irmovl(Esp, 0x40),
            Irmovl(Eax, 11),
            Irmovl(Ebx, 22),
            Push(Eax),
            Push(Ebx),
            Pop(Ecx),
            Pop(Edx),
            Halt,
        ]);
        assert_eq!(state.register(Ecx), 22);
        assert_eq!(state.register(Edx), 11);
        assert_eq!(state.register(Esp), 0x40);
    }

    #[test]
    fn test_push_and_pop_esp() {
        let state = run(&[Irmovl(Esp, 0x40), Push(Esp), Pop(Eax), Halt]);
        assert_eq!(state.register(Eax), 0x40);

        let state = run(&[Irmovl(Esp, 0x40), Irmovl(Eax, 0x20), Push(Eax), Pop(Esp), Halt]);
        assert_eq!(state.register(Esp), 0x20);
    }

    #[test]
    fn test_stack_bounds() {
        let state = run(&[Irmovl(Esp, 3), Push(Eax), Halt]);
        assert_eq!(state.status(), Status::AddressError);
        assert_eq!(state.register(Esp), 3);

        let state = run(&[Irmovl(Esp, 256), Push(Eax), Halt]);
        assert_eq!(state.status(), Status::AddressError);

        // esp must be strictly below memory_size - 4 to pop
        let state = run(&[Irmovl(Esp, 252), Pop(Eax), Halt]);
        assert_eq!(state.status(), Status::AddressError);
        assert_eq!(state.register(Esp), 252);

        let state = run(&[Irmovl(Esp, 251), Pop(Eax), Halt]);
        assert_eq!(state.status(), Status::Halted);
        assert_eq!(state.register(Esp), 255);
    }

    #[test]
    fn test_invalid_register_fields() {
        // rrmovl with an 0xF source
        let mut state = state_with(&[0x20, 0xF0], 64);
        assert_eq!(state.run(None), RunOutcome::Finished(Status::InvalidInstruction));

        // pushl with a register in rB
        let mut state = state_with(&[0xa0, 0x01], 64);
        assert_eq!(state.run(None), RunOutcome::Finished(Status::InvalidInstruction));
        assert_eq!(state.register(Esp), 0);
    }

    #[test]
    fn test_step_limit() {
        // jmp 0, forever
        let program = assemble(&[Jump(Condition::Always, 0)]);
        let mut state = state_with(&program, 64);
        assert_eq!(
            state.run(Some(100)),
            RunOutcome::StepLimitExceeded { steps: 100 }
        );
        assert_eq!(state.status(), Status::Running);
        assert_eq!(state.steps(), 100);

        // a budget exactly as long as the program is enough
        let mut state = state_with(crate::loader::demo::ARITHMETIC, 64);
        assert_eq!(state.run(Some(4)), RunOutcome::Finished(Status::Halted));
    }

    #[test]
    fn test_step_after_termination() {
        let mut state = state_with(&[0x00], 64);
        assert_eq!(state.step(), Status::Halted);
        assert_eq!(state.step(), Status::Halted);
        assert_eq!(state.steps(), 1);
    }

    proptest! {
        #[test]
        fn stack_roundtrip(x: i32, slot in 1i32..60) {
            let mut state = State::new();
            state.allocate(256).expect("memory should be allocated");
            let esp = slot * 4;
            state.set_reg(Esp, esp);

            prop_assert_eq!(state.push(x), Some(()));
            prop_assert_eq!(state.register(Esp), esp - 4);
            prop_assert_eq!(state.pop(), Some(x));
            prop_assert_eq!(state.register(Esp), esp);
        }
    }
}
