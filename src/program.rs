//! A compiled program: opcode buffer, string literal table, native-command
//! hash table, and optional debug tables.

pub mod format;

/// One row of the pos-table: which source position an opcode offset came
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosRow {
  pub pc: u32,
  pub line: u32,
  pub char: u32,
  pub debug_file: u32,
}

/// One row of the cmd-table: a call-target offset paired with a
/// human-readable hint used to render stack traces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdRow {
  pub pc: u32,
  pub debug_hint: u32,
}

/// The output of code generation, ready to execute or serialize to the
/// binary module format.
#[derive(Debug, Clone, Default)]
pub struct Program {
  /// The opcode byte buffer the VM decodes and the verifier walks.
  pub code: Vec<u8>,
  /// String literal table: `LitStr`'s `str_index` operand indexes here, and
  /// the VM interns a fresh heap string from these bytes the first time a
  /// given index executes in a given [`crate::ctx::Context`].
  pub strings: Vec<Vec<u8>>,
  /// Native hash table: `NativeCall`'s `hash_index` operand indexes here,
  /// resolving to the 64-bit murmur-style hash the host registered the
  /// command under.
  pub natives: Vec<u64>,
  /// Debug file names, only populated when compiled with debug info.
  pub debug_files: Vec<String>,
  /// Debug hint strings (command names) for [`CmdRow`], only populated
  /// when compiled with debug info.
  pub debug_hints: Vec<String>,
  pub pos_table: Vec<PosRow>,
  pub cmd_table: Vec<CmdRow>,
}

impl Program {
  pub fn new() -> Self {
    Self::default()
  }

  /// Interns a string literal, reusing an existing table entry with the
  /// same bytes (keeps the literal table small when the same text appears
  /// more than once, e.g. repeated command names).
  pub fn intern_string(&mut self, bytes: &[u8]) -> u32 {
    if let Some(i) = self.strings.iter().position(|s| s.as_slice() == bytes) {
      return i as u32;
    }
    self.strings.push(bytes.to_vec());
    (self.strings.len() - 1) as u32
  }

  pub fn intern_native(&mut self, hash: u64) -> u32 {
    if let Some(i) = self.natives.iter().position(|&h| h == hash) {
      return i as u32;
    }
    self.natives.push(hash);
    (self.natives.len() - 1) as u32
  }

  /// Records the source position an about-to-be-emitted opcode came from.
  /// `pc` is the offset the opcode will be written at; `line`/`char` are
  /// resolved by the caller (via a `SourceMap`) before calling.
  pub fn record_pos(&mut self, pc: u32, line: u32, char: u32, file: u32) {
    self.pos_table.push(PosRow {
      pc,
      line,
      char,
      debug_file: file,
    });
  }

  pub fn record_cmd(&mut self, pc: u32, hint: &str) -> u32 {
    let idx = self.debug_hints.iter().position(|h| h == hint).unwrap_or_else(|| {
      self.debug_hints.push(hint.to_string());
      self.debug_hints.len() - 1
    }) as u32;
    self.cmd_table.push(CmdRow { pc, debug_hint: idx });
    idx
  }

  /// Looks up the nearest preceding pos-table row for `pc`, for runtime
  /// error rendering.
  pub fn pos_for(&self, pc: u32) -> Option<&PosRow> {
    self.pos_table.iter().filter(|row| row.pc <= pc).max_by_key(|row| row.pc)
  }

  /// Looks up the command hint covering `pc` (the nearest cmd-table row at
  /// or before `pc`), for stack-trace rendering.
  pub fn cmd_hint_for(&self, pc: u32) -> Option<&str> {
    let row = self.cmd_table.iter().filter(|row| row.pc <= pc).max_by_key(|row| row.pc)?;
    self.debug_hints.get(row.debug_hint as usize).map(|s| s.as_str())
  }
}
