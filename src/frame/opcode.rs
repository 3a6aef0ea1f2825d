// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! The opcode byte that distinguishes the actual message kind.

use std::convert::TryFrom;

/// An integer byte that distinguishes the actual message:
/// - `0x00`: ERROR
/// - `0x01`: STARTUP
/// - `0x02`: READY
/// - `0x03`: AUTHENTICATE
/// - `0x05`: OPTIONS
/// - `0x06`: SUPPORTED
/// - `0x07`: QUERY
/// - `0x08`: RESULT
/// - `0x09`: PREPARE
/// - `0x0A`: EXECUTE
/// - `0x0B`: REGISTER
/// - `0x0C`: EVENT
/// - `0x0D`: BATCH
/// - `0x0E`: AUTH_CHALLENGE
/// - `0x0F`: AUTH_RESPONSE
/// - `0x10`: AUTH_SUCCESS
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum OpCode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
    Register = 0x0B,
    Event = 0x0C,
    Batch = 0x0D,
    AuthChallenge = 0x0E,
    AuthResponse = 0x0F,
    AuthSuccess = 0x10,
}

impl TryFrom<u8> for OpCode {
    type Error = anyhow::Error;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            0x00 => OpCode::Error,
            0x01 => OpCode::Startup,
            0x02 => OpCode::Ready,
            0x03 => OpCode::Authenticate,
            0x05 => OpCode::Options,
            0x06 => OpCode::Supported,
            0x07 => OpCode::Query,
            0x08 => OpCode::Result,
            0x09 => OpCode::Prepare,
            0x0A => OpCode::Execute,
            0x0B => OpCode::Register,
            0x0C => OpCode::Event,
            0x0D => OpCode::Batch,
            0x0E => OpCode::AuthChallenge,
            0x0F => OpCode::AuthResponse,
            0x10 => OpCode::AuthSuccess,
            other => anyhow::bail!("unknown opcode {:#04x}", other),
        })
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}
