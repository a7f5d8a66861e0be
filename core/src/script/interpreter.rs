//! The stack-machine bytecode interpreter: `eval_script` walks a decoded
//! instruction stream against a data stack, an alt stack, and a condition
//! stack, the same three-stack shape the original engine uses.

use crate::hash::{hash160, ripemd160, sha256};
use crate::script::checker::{find_and_delete, SignatureChecker};
use crate::script::data::ScriptData;
use crate::script::error::ScriptError;
use crate::script::flags::ScriptVerifyFlags;
use crate::script::num::{ScriptNum, DEFAULT_MAX_NUM_SIZE, LOCKTIME_MAX_NUM_SIZE};
use crate::script::opcode::OpCode;
use crate::script::script::Script;
use crate::script::stack::{ConditionStack, Stack};

pub const MAX_SCRIPT_SIZE: usize = 10_000;
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
pub const MAX_OPS_PER_SCRIPT: usize = 201;
pub const MAX_STACK_SIZE: usize = 1_000;
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Top-level entry: runs scriptSig then scriptPubKey (and P2SH's redeem
/// script, and segwit's witness program, if applicable) against a shared
/// stack, mirroring `VerifyScript`'s staged execution.
pub fn verify_script(
    script_sig: &Script,
    script_pubkey: &Script,
    witness: &[Vec<u8>],
    flags: ScriptVerifyFlags,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    if flags.contains(ScriptVerifyFlags::SIGPUSHONLY) && !script_sig.is_push_only() {
        return Err(ScriptError::SigPushOnly);
    }

    let mut stack = Stack::new();
    eval_script(script_sig, &mut stack, flags, checker)?;

    let stack_copy = stack.clone();
    eval_script(script_pubkey, &mut stack, flags, checker)?;

    if stack.depth() == 0 || !stack.top(0)?.as_bool() {
        return Err(ScriptError::EvalFalse);
    }

    let mut is_witness_run = false;
    if flags.contains(ScriptVerifyFlags::WITNESS) {
        if let Some(program) = parse_witness_program(script_pubkey) {
            is_witness_run = true;
            verify_witness_program(&program, witness, flags, checker)?;
        }
    }

    if flags.contains(ScriptVerifyFlags::P2SH) && is_p2sh(script_pubkey) {
        if !script_sig.is_push_only() {
            return Err(ScriptError::SigPushOnly);
        }
        let mut p2sh_stack = stack_copy;
        eval_script(script_sig, &mut p2sh_stack, flags, checker)?;
        let redeem_bytes = p2sh_stack.pop()?.0;
        let redeem_script = Script::new(redeem_bytes);
        eval_script(&redeem_script, &mut p2sh_stack, flags, checker)?;
        if p2sh_stack.depth() == 0 || !p2sh_stack.top(0)?.as_bool() {
            return Err(ScriptError::EvalFalse);
        }
        if flags.contains(ScriptVerifyFlags::WITNESS) {
            if let Some(program) = parse_witness_program(&redeem_script) {
                is_witness_run = true;
                verify_witness_program(&program, witness, flags, checker)?;
            }
        }
        if flags.contains(ScriptVerifyFlags::CLEANSTACK) && p2sh_stack.depth() != 1 {
            return Err(ScriptError::CleanStack);
        }
    } else if flags.contains(ScriptVerifyFlags::CLEANSTACK) && !is_witness_run && stack.depth() != 1 {
        return Err(ScriptError::CleanStack);
    }

    Ok(())
}

struct WitnessProgram {
    version: u8,
    program: Vec<u8>,
}

fn parse_witness_program(script: &Script) -> Option<WitnessProgram> {
    let ins = script.instructions().ok()?;
    if ins.len() != 2 {
        return None;
    }
    let version = match ins[0].op {
        OpCode::OP_0 => 0,
        op if (OpCode::OP_1.value()..=OpCode::OP_16.value()).contains(&op.value()) => {
            op.value() - OpCode::OP_1.value() + 1
        }
        _ => return None,
    };
    let data = ins[1].data.clone()?;
    if !(2..=40).contains(&data.len()) {
        return None;
    }
    Some(WitnessProgram { version, program: data })
}

fn is_p2sh(script: &Script) -> bool {
    script.0.len() == 23
        && script.0[0] == OpCode::OP_HASH160.value()
        && script.0[1] == 20
        && script.0[22] == OpCode::OP_EQUAL.value()
}

fn verify_witness_program(
    program: &WitnessProgram,
    witness: &[Vec<u8>],
    flags: ScriptVerifyFlags,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    if program.version != 0 {
        if flags.contains(ScriptVerifyFlags::DISCOURAGE_UPGRADABLE_WITNESS_PROGRAM) {
            return Err(ScriptError::DiscourageUpgradableWitnessProgram);
        }
        return Ok(());
    }
    if witness.is_empty() {
        return Err(ScriptError::WitnessProgramWitnessEmpty);
    }
    let (script_pubkey, mut stack_items) = match program.program.len() {
        20 => {
            let mut script = Script::new(Vec::new());
            script.0.push(OpCode::OP_DUP.value());
            script.0.push(OpCode::OP_HASH160.value());
            script.0.push(20);
            script.0.extend_from_slice(&program.program);
            script.0.push(OpCode::OP_EQUALVERIFY.value());
            script.0.push(OpCode::OP_CHECKSIG.value());
            (script, witness.to_vec())
        }
        32 => {
            if witness.len() < 2 {
                return Err(ScriptError::WitnessProgramMismatch);
            }
            let redeem = witness.last().unwrap().clone();
            if sha256(&redeem).as_slice() != program.program.as_slice() {
                return Err(ScriptError::WitnessProgramMismatch);
            }
            let mut items = witness.to_vec();
            items.pop();
            (Script::new(redeem), items)
        }
        _ => return Err(ScriptError::WitnessProgramWrongLength),
    };

    let mut stack = Stack::new();
    for item in stack_items.drain(..) {
        stack.push(ScriptData::new(item));
    }
    eval_script(&script_pubkey, &mut stack, flags, checker)?;
    if stack.depth() != 1 {
        return Err(ScriptError::EvalFalse);
    }
    if !stack.top(0)?.as_bool() {
        return Err(ScriptError::EvalFalse);
    }
    Ok(())
}

/// Executes `script` against `stack`, mutating it in place. A fresh alt
/// stack and condition stack are created per invocation, matching scriptSig
/// and scriptPubKey each getting their own control-flow scope.
pub fn eval_script(
    script: &Script,
    stack: &mut Stack,
    flags: ScriptVerifyFlags,
    checker: &dyn SignatureChecker,
) -> Result<(), ScriptError> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(ScriptError::ScriptSize);
    }
    let instructions = script.instructions().map_err(|_| ScriptError::BadOpcode)?;
    let mut alt = Stack::new();
    let mut cond = ConditionStack::new();
    let mut op_count = 0usize;
    let mut codeseparator_pos = 0usize;
    let minimal = flags.contains(ScriptVerifyFlags::MINIMALDATA);

    for ins in &instructions {
        let executing = cond.all_true();

        if let Some(data) = &ins.data {
            if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                return Err(ScriptError::PushSize);
            }
            if executing {
                stack.push(ScriptData::new(data.clone()));
            }
            continue;
        }

        if !matches!(ins.op, OpCode::OP_IF | OpCode::OP_NOTIF | OpCode::OP_ELSE | OpCode::OP_ENDIF) {
            op_count += 1;
            if op_count > MAX_OPS_PER_SCRIPT {
                return Err(ScriptError::OpCount);
            }
        }

        if ins.op.is_disabled() {
            return Err(ScriptError::DisabledOpcode);
        }

        if !executing && !matches!(ins.op, OpCode::OP_IF | OpCode::OP_NOTIF | OpCode::OP_ELSE | OpCode::OP_ENDIF) {
            continue;
        }

        match ins.op {
            OpCode::OP_IF | OpCode::OP_NOTIF => {
                let mut value = false;
                if executing {
                    if flags.contains(ScriptVerifyFlags::MINIMALIF) {
                        let top = stack.top(0)?;
                        if top.0.len() > 1 || (top.0.len() == 1 && top.0[0] != 1) {
                            return Err(ScriptError::MinimalIf);
                        }
                    }
                    value = stack.pop()?.as_bool();
                    if ins.op == OpCode::OP_NOTIF {
                        value = !value;
                    }
                }
                cond.push_back(value);
            }
            OpCode::OP_ELSE => cond.toggle_top()?,
            OpCode::OP_ENDIF => cond.pop_back()?,

            OpCode::OP_NOP => {}
            op if op.is_upgradable_nop() => {
                if flags.contains(ScriptVerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                    return Err(ScriptError::DiscourageUpgradableNops);
                }
            }

            OpCode::OP_VERIFY => {
                if !stack.pop()?.as_bool() {
                    return Err(ScriptError::Verify);
                }
            }
            OpCode::OP_RETURN => return Err(ScriptError::OpReturn),

            OpCode::OP_0 => stack.push(ScriptData::new(Vec::new())),
            OpCode::OP_1NEGATE => stack.push(ScriptData::from_num(ScriptNum::new(-1))),
            op if (OpCode::OP_1.value()..=OpCode::OP_16.value()).contains(&op.value()) => {
                let n = (op.value() - OpCode::OP_1.value() + 1) as i64;
                stack.push(ScriptData::from_num(ScriptNum::new(n)));
            }

            OpCode::OP_TOALTSTACK => alt.push(stack.pop()?),
            OpCode::OP_FROMALTSTACK => stack.push(alt.pop().map_err(|_| ScriptError::InvalidAltstackOperation)?),

            OpCode::OP_2DROP => {
                stack.pop()?;
                stack.pop()?;
            }
            OpCode::OP_2DUP => {
                let a = stack.top(1)?.clone();
                let b = stack.top(0)?.clone();
                stack.push(a);
                stack.push(b);
            }
            OpCode::OP_3DUP => {
                let a = stack.top(2)?.clone();
                let b = stack.top(1)?.clone();
                let c = stack.top(0)?.clone();
                stack.push(a);
                stack.push(b);
                stack.push(c);
            }
            OpCode::OP_2OVER => {
                let a = stack.top(3)?.clone();
                let b = stack.top(2)?.clone();
                stack.push(a);
                stack.push(b);
            }
            OpCode::OP_2ROT => {
                let a = stack.erase(5)?;
                let b = stack.erase(4)?;
                stack.push(a);
                stack.push(b);
            }
            OpCode::OP_2SWAP => {
                stack.swap(2, 0)?;
                stack.swap(3, 1)?;
            }
            OpCode::OP_IFDUP => {
                if stack.top(0)?.as_bool() {
                    let top = stack.top(0)?.clone();
                    stack.push(top);
                }
            }
            OpCode::OP_DEPTH => stack.push(ScriptData::from_num(ScriptNum::new(stack.depth() as i64))),
            OpCode::OP_DROP => {
                stack.pop()?;
            }
            OpCode::OP_DUP => {
                let top = stack.top(0)?.clone();
                stack.push(top);
            }
            OpCode::OP_NIP => {
                stack.erase(1)?;
            }
            OpCode::OP_OVER => {
                let item = stack.top(1)?.clone();
                stack.push(item);
            }
            OpCode::OP_PICK | OpCode::OP_ROLL => {
                let n = stack.pop()?.as_num(minimal, DEFAULT_MAX_NUM_SIZE)?.value();
                if n < 0 {
                    return Err(ScriptError::InvalidStackOperation);
                }
                let item = if ins.op == OpCode::OP_PICK {
                    stack.top(n as usize)?.clone()
                } else {
                    stack.erase(n as usize)?
                };
                stack.push(item);
            }
            OpCode::OP_ROT => {
                stack.swap(2, 1)?;
                stack.swap(1, 0)?;
            }
            OpCode::OP_SWAP => stack.swap(1, 0)?,
            OpCode::OP_TUCK => {
                let top = stack.top(0)?.clone();
                stack.insert(2, top)?;
            }

            OpCode::OP_SIZE => {
                let len = stack.top(0)?.len() as i64;
                stack.push(ScriptData::from_num(ScriptNum::new(len)));
            }

            OpCode::OP_EQUAL | OpCode::OP_EQUALVERIFY => {
                let b = stack.pop()?;
                let a = stack.pop()?;
                let equal = a == b;
                if ins.op == OpCode::OP_EQUALVERIFY {
                    if !equal {
                        return Err(ScriptError::EqualVerify);
                    }
                } else {
                    stack.push(ScriptData::from_bool(equal));
                }
            }

            OpCode::OP_1ADD | OpCode::OP_1SUB | OpCode::OP_NEGATE | OpCode::OP_ABS | OpCode::OP_NOT
            | OpCode::OP_0NOTEQUAL => {
                let n = stack.pop()?.as_num(minimal, DEFAULT_MAX_NUM_SIZE)?;
                let result = match ins.op {
                    OpCode::OP_1ADD => n + ScriptNum::new(1),
                    OpCode::OP_1SUB => n - ScriptNum::new(1),
                    OpCode::OP_NEGATE => -n,
                    OpCode::OP_ABS => if n.value() < 0 { -n } else { n },
                    OpCode::OP_NOT => ScriptNum::new((n.value() == 0) as i64),
                    OpCode::OP_0NOTEQUAL => ScriptNum::new((n.value() != 0) as i64),
                    _ => unreachable!(),
                };
                stack.push(ScriptData::from_num(result));
            }

            OpCode::OP_ADD
            | OpCode::OP_SUB
            | OpCode::OP_BOOLAND
            | OpCode::OP_BOOLOR
            | OpCode::OP_NUMEQUAL
            | OpCode::OP_NUMEQUALVERIFY
            | OpCode::OP_NUMNOTEQUAL
            | OpCode::OP_LESSTHAN
            | OpCode::OP_GREATERTHAN
            | OpCode::OP_LESSTHANOREQUAL
            | OpCode::OP_GREATERTHANOREQUAL
            | OpCode::OP_MIN
            | OpCode::OP_MAX => {
                let b = stack.pop()?.as_num(minimal, DEFAULT_MAX_NUM_SIZE)?;
                let a = stack.pop()?.as_num(minimal, DEFAULT_MAX_NUM_SIZE)?;
                let (av, bv) = (a.value(), b.value());
                let result_num = match ins.op {
                    OpCode::OP_ADD => Some(a + b),
                    OpCode::OP_SUB => Some(a - b),
                    OpCode::OP_BOOLAND => Some(ScriptNum::new((av != 0 && bv != 0) as i64)),
                    OpCode::OP_BOOLOR => Some(ScriptNum::new((av != 0 || bv != 0) as i64)),
                    OpCode::OP_NUMEQUAL | OpCode::OP_NUMEQUALVERIFY => Some(ScriptNum::new((av == bv) as i64)),
                    OpCode::OP_NUMNOTEQUAL => Some(ScriptNum::new((av != bv) as i64)),
                    OpCode::OP_LESSTHAN => Some(ScriptNum::new((av < bv) as i64)),
                    OpCode::OP_GREATERTHAN => Some(ScriptNum::new((av > bv) as i64)),
                    OpCode::OP_LESSTHANOREQUAL => Some(ScriptNum::new((av <= bv) as i64)),
                    OpCode::OP_GREATERTHANOREQUAL => Some(ScriptNum::new((av >= bv) as i64)),
                    OpCode::OP_MIN => Some(if av < bv { a } else { b }),
                    OpCode::OP_MAX => Some(if av > bv { a } else { b }),
                    _ => None,
                };
                if ins.op == OpCode::OP_NUMEQUALVERIFY {
                    if av != bv {
                        return Err(ScriptError::NumEqualVerify);
                    }
                } else {
                    stack.push(ScriptData::from_num(result_num.unwrap()));
                }
            }
            OpCode::OP_WITHIN => {
                let max = stack.pop()?.as_num(minimal, DEFAULT_MAX_NUM_SIZE)?.value();
                let min = stack.pop()?.as_num(minimal, DEFAULT_MAX_NUM_SIZE)?.value();
                let x = stack.pop()?.as_num(minimal, DEFAULT_MAX_NUM_SIZE)?.value();
                stack.push(ScriptData::from_bool(x >= min && x < max));
            }

            OpCode::OP_RIPEMD160 => {
                let data = stack.pop()?;
                stack.push(ScriptData::new(ripemd160(&data.0).to_vec()));
            }
            OpCode::OP_SHA1 => {
                let data = stack.pop()?;
                stack.push(ScriptData::new(sha1_digest(&data.0)));
            }
            OpCode::OP_SHA256 => {
                let data = stack.pop()?;
                stack.push(ScriptData::new(sha256(&data.0).to_vec()));
            }
            OpCode::OP_HASH160 => {
                let data = stack.pop()?;
                stack.push(ScriptData::new(hash160(&data.0).to_vec()));
            }
            OpCode::OP_HASH256 => {
                let data = stack.pop()?;
                let once = sha256(&data.0);
                stack.push(ScriptData::new(sha256(&once).to_vec()));
            }
            OpCode::OP_CODESEPARATOR => {
                if flags.contains(ScriptVerifyFlags::CONST_SCRIPTCODE) {
                    return Err(ScriptError::OpCodeSeparator);
                }
                codeseparator_pos = ins.pos + 1;
            }

            OpCode::OP_CHECKSIG | OpCode::OP_CHECKSIGVERIFY => {
                let pubkey = stack.pop()?;
                let sig = stack.pop()?;
                check_signature_encoding(&sig.0, flags)?;
                check_pubkey_encoding(&pubkey.0, flags)?;
                let script_code = Script::new(script.0[codeseparator_pos..].to_vec());
                let to_remove = push_of(&sig.0);
                if flags.contains(ScriptVerifyFlags::CONST_SCRIPTCODE)
                    && script_code.0.windows(to_remove.len()).any(|w| w == to_remove.as_slice())
                {
                    return Err(ScriptError::SigFindAndDelete);
                }
                let script_code = find_and_delete(&script_code, &to_remove);
                let ok = checker.check_sig(&sig.0, &pubkey.0, &script_code);
                if !ok && flags.contains(ScriptVerifyFlags::NULLFAIL) && !sig.0.is_empty() {
                    return Err(ScriptError::SigNullFail);
                }
                if ins.op == OpCode::OP_CHECKSIGVERIFY {
                    if !ok {
                        return Err(ScriptError::CheckSigVerify);
                    }
                } else {
                    stack.push(ScriptData::from_bool(ok));
                }
            }
            OpCode::OP_CHECKMULTISIG | OpCode::OP_CHECKMULTISIGVERIFY => {
                let ok = check_multisig(stack, flags, checker, script, codeseparator_pos, &mut op_count)?;
                if ins.op == OpCode::OP_CHECKMULTISIGVERIFY {
                    if !ok {
                        return Err(ScriptError::CheckMultisigVerify);
                    }
                } else {
                    stack.push(ScriptData::from_bool(ok));
                }
            }

            OpCode::OP_CHECKLOCKTIMEVERIFY => {
                if !flags.contains(ScriptVerifyFlags::CHECKLOCKTIMEVERIFY) {
                    if flags.contains(ScriptVerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                        return Err(ScriptError::DiscourageUpgradableNops);
                    }
                } else {
                    let n = stack.top(0)?.as_num(minimal, LOCKTIME_MAX_NUM_SIZE)?;
                    if n.value() < 0 {
                        return Err(ScriptError::NegativeLockTime);
                    }
                    if !checker.check_lock_time(n) {
                        return Err(ScriptError::UnsatisfiedLockTime);
                    }
                }
            }
            OpCode::OP_CHECKSEQUENCEVERIFY => {
                if !flags.contains(ScriptVerifyFlags::CHECKSEQUENCEVERIFY) {
                    if flags.contains(ScriptVerifyFlags::DISCOURAGE_UPGRADABLE_NOPS) {
                        return Err(ScriptError::DiscourageUpgradableNops);
                    }
                } else {
                    let n = stack.top(0)?.as_num(minimal, LOCKTIME_MAX_NUM_SIZE)?;
                    if n.value() < 0 {
                        return Err(ScriptError::NegativeLockTime);
                    }
                    if n.value() & (1 << 31) == 0 && !checker.check_sequence(n) {
                        return Err(ScriptError::UnsatisfiedLockTime);
                    }
                }
            }

            OpCode::PUSHBYTES(_) | OpCode::OP_PUSHDATA1 | OpCode::OP_PUSHDATA2 | OpCode::OP_PUSHDATA4 => {
                unreachable!("pushes are handled via ins.data above")
            }
            OpCode::OP_VER | OpCode::OP_RESERVED | OpCode::OP_RESERVED1 | OpCode::OP_RESERVED2 => {
                return Err(ScriptError::BadOpcode)
            }
            OpCode::OP_INVALIDOPCODE => return Err(ScriptError::BadOpcode),
            _ => return Err(ScriptError::BadOpcode),
        }

        if stack.depth() + alt.depth() > MAX_STACK_SIZE {
            return Err(ScriptError::StackSize);
        }
    }

    if !cond.empty() {
        return Err(ScriptError::UnbalancedConditional);
    }

    Ok(())
}

/// The minimal-push encoding of `data` as it would appear inlined in a
/// script, used to find-and-delete a signature from scriptCode.
fn push_of(data: &[u8]) -> Vec<u8> {
    Script::new(Vec::new()).push_data(data).0
}

fn sha1_digest(data: &[u8]) -> Vec<u8> {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

fn check_multisig(
    stack: &mut Stack,
    flags: ScriptVerifyFlags,
    checker: &dyn SignatureChecker,
    script: &Script,
    codeseparator_pos: usize,
    op_count: &mut usize,
) -> Result<bool, ScriptError> {
    let n = stack.pop()?.as_num(flags.contains(ScriptVerifyFlags::MINIMALDATA), DEFAULT_MAX_NUM_SIZE)?.value();
    if !(0..=MAX_PUBKEYS_PER_MULTISIG as i64).contains(&n) {
        return Err(ScriptError::PubkeyCount);
    }
    *op_count += n as usize;
    if *op_count > MAX_OPS_PER_SCRIPT {
        return Err(ScriptError::OpCount);
    }
    let mut pubkeys = Vec::with_capacity(n as usize);
    for _ in 0..n {
        pubkeys.push(stack.pop()?.0);
    }
    let m = stack.pop()?.as_num(flags.contains(ScriptVerifyFlags::MINIMALDATA), DEFAULT_MAX_NUM_SIZE)?.value();
    if !(0..=n).contains(&m) {
        return Err(ScriptError::SigCount);
    }
    let mut sigs = Vec::with_capacity(m as usize);
    for _ in 0..m {
        sigs.push(stack.pop()?.0);
    }

    // the off-by-one dummy element consumed by CHECKMULTISIG's historical bug
    let dummy = stack.pop()?;
    if flags.contains(ScriptVerifyFlags::NULLDUMMY) && !dummy.0.is_empty() {
        return Err(ScriptError::SigNullDummy);
    }

    for sig in &sigs {
        check_signature_encoding(sig, flags)?;
    }
    for pk in &pubkeys {
        check_pubkey_encoding(pk, flags)?;
    }

    let mut script_code = Script::new(script.0[codeseparator_pos..].to_vec());
    for sig in &sigs {
        let to_remove = push_of(sig);
        if flags.contains(ScriptVerifyFlags::CONST_SCRIPTCODE)
            && script_code.0.windows(to_remove.len()).any(|w| w == to_remove.as_slice())
        {
            return Err(ScriptError::SigFindAndDelete);
        }
        script_code = find_and_delete(&script_code, &to_remove);
    }

    let mut pubkey_idx = 0usize;
    let mut sig_idx = 0usize;
    let mut success = true;
    while success && sig_idx < sigs.len() {
        if pubkey_idx >= pubkeys.len() {
            success = false;
            break;
        }
        if checker.check_sig(&sigs[sig_idx], &pubkeys[pubkey_idx], &script_code) {
            sig_idx += 1;
        }
        pubkey_idx += 1;
        if sigs.len() - sig_idx > pubkeys.len() - pubkey_idx {
            success = false;
        }
    }

    if !success && flags.contains(ScriptVerifyFlags::NULLFAIL) && sigs.iter().any(|s| !s.is_empty()) {
        return Err(ScriptError::SigNullFail);
    }

    Ok(success)
}

/// BIP66 strict DER plus BIP62 low-S, gated by the relevant flags. An empty
/// signature (used as a deliberate CHECKMULTISIG/CHECKSIG failure marker)
/// always passes encoding checks.
fn check_signature_encoding(sig: &[u8], flags: ScriptVerifyFlags) -> Result<(), ScriptError> {
    if sig.is_empty() {
        return Ok(());
    }
    if flags.intersects(ScriptVerifyFlags::DERSIG | ScriptVerifyFlags::LOW_S | ScriptVerifyFlags::STRICTENC)
        && !is_valid_der(&sig[..sig.len() - 1])
    {
        return Err(ScriptError::SigDer);
    }
    if flags.contains(ScriptVerifyFlags::LOW_S) && !is_low_s(&sig[..sig.len() - 1]) {
        return Err(ScriptError::SigHighS);
    }
    if flags.contains(ScriptVerifyFlags::STRICTENC) {
        let hash_type = sig[sig.len() - 1] & !0x80;
        if !(1..=3).contains(&hash_type) {
            return Err(ScriptError::SigHashType);
        }
    }
    Ok(())
}

fn check_pubkey_encoding(pubkey: &[u8], flags: ScriptVerifyFlags) -> Result<(), ScriptError> {
    if flags.contains(ScriptVerifyFlags::STRICTENC) && !is_compressed_or_uncompressed_pubkey(pubkey) {
        return Err(ScriptError::PubKeyType);
    }
    if flags.contains(ScriptVerifyFlags::WITNESS_PUBKEYTYPE)
        && flags.contains(ScriptVerifyFlags::WITNESS)
        && !is_compressed_pubkey(pubkey)
    {
        return Err(ScriptError::WitnessPubkeytype);
    }
    Ok(())
}

fn is_compressed_or_uncompressed_pubkey(pubkey: &[u8]) -> bool {
    match pubkey.len() {
        33 => pubkey[0] == 0x02 || pubkey[0] == 0x03,
        65 => pubkey[0] == 0x04,
        _ => false,
    }
}

fn is_compressed_pubkey(pubkey: &[u8]) -> bool {
    pubkey.len() == 33 && (pubkey[0] == 0x02 || pubkey[0] == 0x03)
}

/// Strict DER encoding check (BIP66), independent of secp256k1's own
/// parser so non-strict-but-otherwise-parseable signatures are still
/// rejected under the DERSIG flag.
fn is_valid_der(sig: &[u8]) -> bool {
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 2 {
        return false;
    }
    if sig[2] != 0x02 {
        return false;
    }
    let len_r = sig[3] as usize;
    if len_r == 0 || 4 + len_r >= sig.len() {
        return false;
    }
    if sig[4] & 0x80 != 0 {
        return false;
    }
    if len_r > 1 && sig[4] == 0 && sig[5] & 0x80 == 0 {
        return false;
    }
    let s_offset = 4 + len_r;
    if sig[s_offset] != 0x02 {
        return false;
    }
    let len_s = sig[s_offset + 1] as usize;
    if len_s == 0 || s_offset + 2 + len_s != sig.len() {
        return false;
    }
    if sig[s_offset + 2] & 0x80 != 0 {
        return false;
    }
    if len_s > 1 && sig[s_offset + 2] == 0 && sig[s_offset + 3] & 0x80 == 0 {
        return false;
    }
    true
}

/// BIP62 rule 5: `S` must be at most half the curve order (secp256k1's
/// canonical low-S form), checked directly on the DER bytes to avoid
/// depending on signature parsing succeeding first.
fn is_low_s(sig: &[u8]) -> bool {
    if !is_valid_der(sig) {
        return false;
    }
    let len_r = sig[3] as usize;
    let s_offset = 4 + len_r;
    let len_s = sig[s_offset + 1] as usize;
    let s_bytes = &sig[s_offset + 2..s_offset + 2 + len_s];
    const HALF_ORDER: [u8; 32] = [
        0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x5d, 0x57,
        0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
    ];
    let mut padded = [0u8; 32];
    if s_bytes.len() > 32 {
        return false;
    }
    padded[32 - s_bytes.len()..].copy_from_slice(s_bytes);
    padded <= HALF_ORDER
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::opcode::OpCode;

    struct AlwaysTrueChecker;
    impl SignatureChecker for AlwaysTrueChecker {
        fn check_sig(&self, _sig: &[u8], _pubkey: &[u8], _script_code: &Script) -> bool {
            true
        }
        fn check_lock_time(&self, _lock_time: ScriptNum) -> bool {
            true
        }
        fn check_sequence(&self, _sequence: ScriptNum) -> bool {
            true
        }
    }

    #[test]
    fn push_and_equal_succeeds() {
        let script = Script::new(Vec::new())
            .push_data(b"abc")
            .push_data(b"abc")
            .push_op(OpCode::OP_EQUAL);
        let mut stack = Stack::new();
        eval_script(&script, &mut stack, ScriptVerifyFlags::NONE, &AlwaysTrueChecker).unwrap();
        assert!(stack.top(0).unwrap().as_bool());
    }

    #[test]
    fn if_else_endif_picks_branch() {
        // push 0, IF <push 1> ELSE <push 2> ENDIF
        let script = Script::new(Vec::new())
            .push_op(OpCode::OP_0)
            .push_op(OpCode::OP_IF)
            .push_op(OpCode::OP_1)
            .push_op(OpCode::OP_ELSE)
            .push_op(OpCode::OP_2)
            .push_op(OpCode::OP_ENDIF);
        let mut stack = Stack::new();
        eval_script(&script, &mut stack, ScriptVerifyFlags::NONE, &AlwaysTrueChecker).unwrap();
        assert_eq!(stack.top(0).unwrap().as_num(false, 4).unwrap().value(), 2);
    }

    #[test]
    fn unbalanced_conditional_is_an_error() {
        let script = Script::new(Vec::new()).push_op(OpCode::OP_1).push_op(OpCode::OP_IF);
        let mut stack = Stack::new();
        assert!(eval_script(&script, &mut stack, ScriptVerifyFlags::NONE, &AlwaysTrueChecker).is_err());
    }

    #[test]
    fn checksig_consumes_pubkey_and_sig() {
        let script = Script::new(Vec::new()).push_op(OpCode::OP_CHECKSIG);
        let mut stack = Stack::new();
        stack.push(ScriptData::new(vec![1, 2, 3])); // sig
        stack.push(ScriptData::new(vec![4, 5, 6])); // pubkey
        eval_script(&script, &mut stack, ScriptVerifyFlags::NONE, &AlwaysTrueChecker).unwrap();
        assert!(stack.top(0).unwrap().as_bool());
    }

    #[test]
    fn low_s_rejects_high_s_value() {
        // S = HALF_ORDER + 1, minimal-length DER encoding, R is a single zero byte.
        let mut sig = vec![0x30, 0x25, 0x02, 0x01, 0x01, 0x02, 0x21, 0x00];
        let mut s = vec![
            0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x5d,
            0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa1,
        ];
        sig.append(&mut s);
        assert!(!is_low_s(&sig));
    }
}
