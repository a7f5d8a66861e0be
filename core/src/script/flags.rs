//! Script verification flags, toggled per-policy and per-soft-fork.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScriptVerifyFlags: u32 {
        const NONE = 0;
        const P2SH = 1 << 0;
        const STRICTENC = 1 << 1;
        const DERSIG = 1 << 2;
        const LOW_S = 1 << 3;
        const NULLDUMMY = 1 << 4;
        const SIGPUSHONLY = 1 << 5;
        const MINIMALDATA = 1 << 6;
        const DISCOURAGE_UPGRADABLE_NOPS = 1 << 7;
        const CLEANSTACK = 1 << 8;
        const CHECKLOCKTIMEVERIFY = 1 << 9;
        const CHECKSEQUENCEVERIFY = 1 << 10;
        const WITNESS = 1 << 11;
        const DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM = 1 << 12;
        const MINIMALIF = 1 << 13;
        const NULLFAIL = 1 << 14;
        const WITNESS_PUBKEYTYPE = 1 << 15;
        const CONST_SCRIPTCODE = 1 << 16;
    }
}

impl Default for ScriptVerifyFlags {
    fn default() -> Self {
        ScriptVerifyFlags::NONE
    }
}

/// The flag set applied to transactions entering the mempool/new blocks:
/// every soft-fork rule active.
pub const STANDARD: ScriptVerifyFlags = ScriptVerifyFlags::from_bits_truncate(
    ScriptVerifyFlags::P2SH.bits()
        | ScriptVerifyFlags::STRICTENC.bits()
        | ScriptVerifyFlags::DERSIG.bits()
        | ScriptVerifyFlags::LOW_S.bits()
        | ScriptVerifyFlags::NULLDUMMY.bits()
        | ScriptVerifyFlags::SIGPUSHONLY.bits()
        | ScriptVerifyFlags::MINIMALDATA.bits()
        | ScriptVerifyFlags::DISCOURAGE_UPGRADABLE_NOPS.bits()
        | ScriptVerifyFlags::CLEANSTACK.bits()
        | ScriptVerifyFlags::CHECKLOCKTIMEVERIFY.bits()
        | ScriptVerifyFlags::CHECKSEQUENCEVERIFY.bits()
        | ScriptVerifyFlags::WITNESS.bits()
        | ScriptVerifyFlags::DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM.bits()
        | ScriptVerifyFlags::NULLFAIL.bits(),
);
