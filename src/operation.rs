//! State-backend operations and their argument-encoded forms.
//!
//! An [`ArgOp`] pairs an [`Operation`] with the [`AccessClass`] of each of its
//! (address, key, value) arguments. It has two stable representations:
//!
//! - an integer produced by a mixed-radix (Horner) encoding with radix
//!   [`NUM_CLASSES`], used to index frequency tables;
//! - an opcode string `<mnemonic><class letters>` such as `"SSpqz"`, used in
//!   the JSON files.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StochasticError};
use crate::statistics::{AccessClass, NUM_CLASSES};

/// Number of operations.
pub const NUM_OPS: usize = 28;

/// Number of encoded operations (valid or not).
pub const NUM_ARG_OPS: usize = NUM_OPS * NUM_CLASSES * NUM_CLASSES * NUM_CLASSES;

/// A primitive of the state backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Operation {
    AddBalance = 0,
    BeginBlock,
    BeginSyncPeriod,
    BeginTransaction,
    CreateAccount,
    Empty,
    EndBlock,
    EndSyncPeriod,
    EndTransaction,
    Exist,
    Finalise,
    GetBalance,
    GetCodeHash,
    GetCode,
    GetCodeSize,
    GetCommittedState,
    GetNonce,
    GetState,
    HasSuicided,
    RevertToSnapshot,
    SetCode,
    SetNonce,
    SetState,
    Snapshot,
    SubBalance,
    Suicide,
    GetTransientState,
    SetTransientState,
}

impl Operation {
    /// All operations in id order.
    pub const ALL: [Operation; NUM_OPS] = [
        Operation::AddBalance,
        Operation::BeginBlock,
        Operation::BeginSyncPeriod,
        Operation::BeginTransaction,
        Operation::CreateAccount,
        Operation::Empty,
        Operation::EndBlock,
        Operation::EndSyncPeriod,
        Operation::EndTransaction,
        Operation::Exist,
        Operation::Finalise,
        Operation::GetBalance,
        Operation::GetCodeHash,
        Operation::GetCode,
        Operation::GetCodeSize,
        Operation::GetCommittedState,
        Operation::GetNonce,
        Operation::GetState,
        Operation::HasSuicided,
        Operation::RevertToSnapshot,
        Operation::SetCode,
        Operation::SetNonce,
        Operation::SetState,
        Operation::Snapshot,
        Operation::SubBalance,
        Operation::Suicide,
        Operation::GetTransientState,
        Operation::SetTransientState,
    ];

    pub fn id(self) -> usize {
        self as usize
    }

    /// Looks an operation up by id.
    pub fn from_id(id: usize) -> Result<Self> {
        Self::ALL
            .get(id)
            .copied()
            .ok_or(StochasticError::InvalidOperation(id))
    }

    /// Two-letter mnemonic (stable wire format).
    pub fn mnemonic(self) -> &'static str {
        match self {
            Operation::AddBalance => "AB",
            Operation::BeginBlock => "BB",
            Operation::BeginSyncPeriod => "BS",
            Operation::BeginTransaction => "BT",
            Operation::CreateAccount => "CA",
            Operation::Empty => "EM",
            Operation::EndBlock => "EB",
            Operation::EndSyncPeriod => "ES",
            Operation::EndTransaction => "ET",
            Operation::Exist => "EX",
            Operation::Finalise => "FI",
            Operation::GetBalance => "GB",
            Operation::GetCodeHash => "GH",
            Operation::GetCode => "GC",
            Operation::GetCodeSize => "GZ",
            Operation::GetCommittedState => "GM",
            Operation::GetNonce => "GN",
            Operation::GetState => "GS",
            Operation::HasSuicided => "HS",
            Operation::RevertToSnapshot => "RS",
            Operation::SetCode => "SC",
            Operation::SetNonce => "SO",
            Operation::SetState => "SS",
            Operation::Snapshot => "SN",
            Operation::SubBalance => "SB",
            Operation::Suicide => "SU",
            Operation::GetTransientState => "GT",
            Operation::SetTransientState => "ST",
        }
    }

    /// Parses a two-letter mnemonic.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.mnemonic() == mnemonic)
    }

    /// How many of (address, key, value) the operation consumes.
    pub fn arity(self) -> usize {
        match self {
            Operation::BeginBlock
            | Operation::BeginSyncPeriod
            | Operation::BeginTransaction
            | Operation::EndBlock
            | Operation::EndSyncPeriod
            | Operation::EndTransaction
            | Operation::Finalise
            | Operation::RevertToSnapshot
            | Operation::Snapshot => 0,
            Operation::GetCommittedState
            | Operation::GetState
            | Operation::GetTransientState => 2,
            Operation::SetState | Operation::SetTransientState => 3,
            _ => 1,
        }
    }

    /// Operations that open or close a sync period, block or transaction.
    pub fn is_scoping(self) -> bool {
        matches!(
            self,
            Operation::BeginSyncPeriod
                | Operation::EndSyncPeriod
                | Operation::BeginBlock
                | Operation::EndBlock
                | Operation::BeginTransaction
                | Operation::EndTransaction
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An operation together with the classes of its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgOp {
    pub op: Operation,
    pub address: AccessClass,
    pub key: AccessClass,
    pub value: AccessClass,
}

impl ArgOp {
    /// Creates an argument-encoded operation, checking the classes against the arity.
    pub fn new(
        op: Operation,
        address: AccessClass,
        key: AccessClass,
        value: AccessClass,
    ) -> Result<Self> {
        let arg_op = Self {
            op,
            address,
            key,
            value,
        };
        if arg_op.is_consistent() {
            Ok(arg_op)
        } else {
            Err(StochasticError::InvalidArgOp {
                op,
                address,
                key,
                value,
            })
        }
    }

    fn is_consistent(&self) -> bool {
        let used = [self.address, self.key, self.value].map(|c| c != AccessClass::NoArg);
        match self.op.arity() {
            0 => used == [false, false, false],
            1 => used == [true, false, false],
            2 => used == [true, true, false],
            3 => used == [true, true, true],
            _ => false,
        }
    }

    /// Horner encoding of the operation and its argument classes.
    pub fn encode(&self) -> usize {
        ((self.op.id() * NUM_CLASSES + self.address.id()) * NUM_CLASSES + self.key.id())
            * NUM_CLASSES
            + self.value.id()
    }

    /// Decodes an encoded operation; fails for out-of-range or arity-inconsistent codes.
    pub fn decode(arg_op: usize) -> Result<Self> {
        if arg_op >= NUM_ARG_OPS {
            return Err(StochasticError::ArgOpOutOfRange(arg_op));
        }
        let class = |id: usize| AccessClass::from_id(id % NUM_CLASSES).unwrap_or(AccessClass::NoArg);
        let value = class(arg_op);
        let key = class(arg_op / NUM_CLASSES);
        let address = class(arg_op / (NUM_CLASSES * NUM_CLASSES));
        let op = Operation::from_id(arg_op / (NUM_CLASSES * NUM_CLASSES * NUM_CLASSES))?;
        Self::new(op, address, key, value)
    }

    /// Returns true if `arg_op` encodes an arity-consistent operation.
    pub fn is_valid(arg_op: usize) -> bool {
        Self::decode(arg_op).is_ok()
    }

    /// Iterates over all valid argument-encoded operations in encoding order.
    pub fn all_valid() -> impl Iterator<Item = ArgOp> {
        (0..NUM_ARG_OPS).filter_map(|code| Self::decode(code).ok())
    }

    /// Opcode string, e.g. `"SSpqz"`.
    pub fn opcode(&self) -> String {
        let mut code = String::with_capacity(2 + self.op.arity());
        code.push_str(self.op.mnemonic());
        code.extend([self.address, self.key, self.value].iter().filter_map(|c| c.mnemonic()));
        code
    }

    /// Parses an opcode string.
    pub fn from_opcode(opcode: &str) -> Result<Self> {
        let invalid = || StochasticError::InvalidOpcode(opcode.to_string());
        let mnemonic = opcode.get(..2).ok_or_else(invalid)?;
        let op = Operation::from_mnemonic(mnemonic).ok_or_else(invalid)?;
        if opcode.len() != 2 + op.arity() {
            return Err(invalid());
        }
        let mut classes = [AccessClass::NoArg; 3];
        for (slot, c) in classes.iter_mut().zip(opcode[2..].chars()) {
            *slot = AccessClass::from_mnemonic(c).ok_or_else(invalid)?;
        }
        Self::new(op, classes[0], classes[1], classes[2])
    }
}

impl fmt::Display for ArgOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.opcode())
    }
}

impl FromStr for ArgOp {
    type Err = StochasticError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_opcode(s)
    }
}
