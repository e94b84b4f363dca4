//! Program validation: a compiled module is checked once, before it is
//! ever dispatched, so the run loop itself can trust every operand without
//! re-checking bounds on every step.

use crate::op::{DecodeError, Op};
use crate::program::Program;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
  #[error("malformed opcode stream: {0}")]
  Decode(#[from] DecodeError),
  #[error("jump target {0} does not land on an instruction boundary")]
  BadJumpTarget(u32),
  #[error("call target {0} does not point at a command head")]
  BadCallTarget(u32),
  #[error("unmatched cmdtail at {0}")]
  UnmatchedCmdTail(usize),
  #[error("command body at {0} is missing its cmdtail")]
  MissingCmdTail(usize),
  #[error("string index {0} out of range")]
  BadStringIndex(u32),
  #[error("native index {0} out of range")]
  BadNativeIndex(u32),
  #[error("opcode buffer does not end with the end-of-program marker")]
  MissingTerminator,
}

/// Walks `program`'s opcode buffer once, proving every invariant the
/// dispatch loop relies on: instruction boundaries are self-consistent,
/// jump/call targets land where they claim, `cmdhead`/`cmdtail` nest
/// correctly, and string/native table indices are in range.
pub fn verify(program: &Program) -> Result<(), VerifyError> {
  let code = &program.code;
  let mut boundaries = Vec::new();
  let mut head_stack: Vec<usize> = Vec::new();
  let mut pc = 0usize;
  let mut saw_end = false;

  while pc < code.len() {
    boundaries.push(pc);
    let (op, next) = Op::decode(code, pc)?;
    match &op {
      Op::LitStr { str_index, .. } => {
        if *str_index as usize >= program.strings.len() {
          return Err(VerifyError::BadStringIndex(*str_index));
        }
      }
      Op::NativeCall { hash_index, .. } => {
        if *hash_index as usize >= program.natives.len() {
          return Err(VerifyError::BadNativeIndex(*hash_index));
        }
      }
      Op::CmdHead { .. } => head_stack.push(pc),
      Op::CmdTail => {
        if head_stack.pop().is_none() {
          return Err(VerifyError::UnmatchedCmdTail(pc));
        }
      }
      Op::End => {
        saw_end = true;
        pc = next;
        break;
      }
      _ => {}
    }
    pc = next;
  }

  if let Some(head_pc) = head_stack.pop() {
    return Err(VerifyError::MissingCmdTail(head_pc));
  }
  if !saw_end || pc != code.len() {
    return Err(VerifyError::MissingTerminator);
  }

  // Second pass: every jump/call target must land exactly on a decoded
  // instruction boundary, and call targets must specifically be `cmdhead`.
  let mut pc = 0usize;
  while pc < code.len() {
    let (op, next) = Op::decode(code, pc)?;
    match op {
      Op::Jump { target } | Op::JumpIfTrue { target, .. } | Op::JumpIfFalse { target, .. } => {
        check_boundary(&boundaries, target)?;
      }
      Op::Call { target, .. } | Op::ReturnTail { target, .. } => {
        check_is_cmdhead(code, &boundaries, target)?;
      }
      Op::End => break,
      _ => {}
    }
    pc = next;
  }

  Ok(())
}

fn check_boundary(boundaries: &[usize], target: u32) -> Result<(), VerifyError> {
  if boundaries.binary_search(&(target as usize)).is_ok() {
    Ok(())
  } else {
    Err(VerifyError::BadJumpTarget(target))
  }
}

fn check_is_cmdhead(code: &[u8], boundaries: &[usize], target: u32) -> Result<(), VerifyError> {
  check_boundary(boundaries, target)?;
  match Op::decode(code, target as usize) {
    Ok((Op::CmdHead { .. }, _)) => Ok(()),
    _ => Err(VerifyError::BadCallTarget(target)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::op::{Op, Reg};

  fn build(ops: &[Op]) -> Program {
    let mut program = Program::new();
    for op in ops {
      op.encode(&mut program.code);
    }
    program.code.push(0xFD);
    program
  }

  #[test]
  fn accepts_well_formed_program() {
    let program = build(&[
      Op::CmdHead { level: 0, params: 0, rest: 0xFF },
      Op::LitNum { dst: Reg::here(0), value: 1.0 },
      Op::Return { src: Reg::here(0) },
      Op::CmdTail,
    ]);
    assert!(verify(&program).is_ok());
  }

  #[test]
  fn rejects_jump_into_the_middle_of_an_instruction() {
    let program = build(&[
      Op::Jump { target: 3 }, // lands inside the Jump op itself
      Op::End,
    ]);
    assert!(matches!(verify(&program), Err(VerifyError::BadJumpTarget(3))));
  }

  #[test]
  fn rejects_unmatched_cmdtail() {
    let program = build(&[Op::CmdTail]);
    assert!(matches!(verify(&program), Err(VerifyError::UnmatchedCmdTail(_))));
  }

  #[test]
  fn rejects_call_to_non_cmdhead() {
    // `target` below is the byte offset of the `Nil` instruction: a valid
    // instruction boundary, but not a `cmdhead`.
    let call = Op::Call {
      target: 0,
      dst: Reg::here(0),
      args: vec![],
      spread_last: false,
    };
    let mut call_bytes = Vec::new();
    call.encode(&mut call_bytes);
    let nil_target = call_bytes.len() as u32;

    let program = build(&[
      Op::Call {
        target: nil_target,
        dst: Reg::here(0),
        args: vec![],
        spread_last: false,
      },
      Op::Nil { dst: Reg::here(0) },
    ]);
    assert!(matches!(verify(&program), Err(VerifyError::BadCallTarget(t)) if t == nil_target));
  }

  #[test]
  fn rejects_missing_terminator() {
    let mut program = Program::new();
    Op::Nil { dst: Reg::here(0) }.encode(&mut program.code);
    assert!(matches!(verify(&program), Err(VerifyError::MissingTerminator)));
  }
}
