//! Encoding emitted routines into method bodies and decoding them back

use quill_bytecode::{disassemble, RawOperand};
use quill_emit::body::{SIGNATURE_TAG, USER_STRING_TAG};
use quill_emit::{
    BodyError, BranchEncoding, CallSite, ClauseKind, Emit, Emitter, EmitterOptions,
    ExceptionClause, Instruction, MethodBodySink, OpCode, Operations, SymbolScope, TypeCode,
    TypeRef,
};

fn int32() -> TypeRef {
    TypeRef::primitive(TypeCode::Int32)
}

fn decoded(code: &[u8]) -> Vec<(usize, OpCode, RawOperand)> {
    disassemble(code)
        .unwrap()
        .into_iter()
        .map(|d| (d.offset, d.opcode, d.operand))
        .collect()
}

#[test]
fn test_body_decodes_to_emitted_forms() {
    let mut e = Emitter::with_sink(MethodBodySink::new());
    let done = e.define_label(Some("done")).unwrap();
    let acc = e.declare_local(int32(), false, Some("acc")).unwrap();
    e.ldarg(0)
        .unwrap()
        .ldc_i4(10)
        .unwrap()
        .blt(&done, false)
        .unwrap()
        .ldstr("big")
        .unwrap()
        .pop()
        .unwrap()
        .ldc_i4(0)
        .unwrap()
        .stloc(&acc)
        .unwrap()
        .mark_label(&done)
        .unwrap()
        .ldstr("big")
        .unwrap()
        .pop()
        .unwrap()
        .ret()
        .unwrap();

    let (stream, sink) = e.into_parts();
    let body = sink.finish().unwrap();
    assert_eq!(body.code.len(), stream.offset());

    let big = USER_STRING_TAG | 1;
    assert_eq!(
        decoded(&body.code),
        vec![
            (0, OpCode::Ldarg0, RawOperand::None),
            (1, OpCode::LdcI4S, RawOperand::I8(10)),
            (3, OpCode::BltS, RawOperand::Target(13)),
            (5, OpCode::Ldstr, RawOperand::Token(big)),
            (10, OpCode::Pop, RawOperand::None),
            (11, OpCode::LdcI4_0, RawOperand::None),
            (12, OpCode::Stloc0, RawOperand::None),
            (13, OpCode::Ldstr, RawOperand::Token(big)),
            (18, OpCode::Pop, RawOperand::None),
            (19, OpCode::Ret, RawOperand::None),
        ]
    );
    assert_eq!(body.strings.len(), 1);
    assert_eq!(&*body.strings[0], "big");
    assert_eq!(body.locals.len(), 1);
    assert_eq!(body.locals[0].index, 0);
}

#[test]
fn test_backward_loop_and_switch() {
    let mut e = Emitter::with_sink(MethodBodySink::new());
    let head = e.define_label(Some("head")).unwrap();
    let zero = e.define_label(Some("zero")).unwrap();
    let one = e.define_label(Some("one")).unwrap();
    e.mark_label(&head).unwrap();
    e.ldarg(0).unwrap().switch(&[zero.clone(), one.clone()]).unwrap();
    e.br(&head).unwrap();
    e.mark_label(&zero).unwrap().ret().unwrap();
    e.mark_label(&one).unwrap().ret().unwrap();

    let body = e.into_sink().finish().unwrap();
    // ldarg.0, switch (1 + 4 + 2 * 4), br.s, ret, ret
    assert_eq!(
        decoded(&body.code),
        vec![
            (0, OpCode::Ldarg0, RawOperand::None),
            (1, OpCode::Switch, RawOperand::Targets(vec![16, 17])),
            (14, OpCode::BrS, RawOperand::Target(0)),
            (16, OpCode::Ret, RawOperand::None),
            (17, OpCode::Ret, RawOperand::None),
        ]
    );
}

#[test]
fn test_short_branch_overflow_reported_at_finish() {
    let build = |options: EmitterOptions| {
        let mut e = Emitter::with_sink(MethodBodySink::new()).with_options(options);
        let far = e.define_label(Some("far")).unwrap();
        e.br(&far).unwrap();
        for _ in 0..200 {
            e.nop().unwrap();
        }
        e.mark_label(&far).unwrap().ret().unwrap();
        e.into_sink().finish()
    };

    assert_eq!(
        build(EmitterOptions::default()).unwrap_err(),
        BodyError::BranchOutOfRange {
            offset: 1,
            label: "far".to_string(),
            displacement: 200,
        }
    );

    let body = build(EmitterOptions::default().with_branch_encoding(BranchEncoding::AlwaysLong))
        .unwrap();
    assert_eq!(body.code[0], 0x38);
    assert_eq!(i32::from_le_bytes(body.code[1..5].try_into().unwrap()), 200);
}

#[test]
fn test_unmarked_label_fails_finish() {
    let mut e = Emitter::with_sink(MethodBodySink::new());
    let nowhere = e.define_label(Some("nowhere")).unwrap();
    e.brfalse(&nowhere).unwrap().ret().unwrap();
    assert_eq!(
        e.into_sink().finish().unwrap_err(),
        BodyError::UnmarkedLabel("nowhere".to_string())
    );
}

#[test]
fn test_try_catch_clause_table() {
    let failure = TypeRef::new("Acme.Error", TypeCode::Class, 0x0100_0001);
    let mut e = Emitter::with_sink(MethodBodySink::new());
    e.try_block(|e| {
        e.nop()?;
        Ok(())
    })
    .unwrap()
    .catch(failure, |e| {
        e.pop()?;
        Ok(())
    })
    .unwrap()
    .end()
    .unwrap()
    .ret()
    .unwrap();

    let body = e.into_sink().finish().unwrap();
    assert_eq!(
        body.clauses,
        vec![ExceptionClause {
            kind: ClauseKind::Catch {
                type_token: 0x0100_0001,
            },
            try_offset: 0,
            try_length: 6,
            handler_offset: 6,
            handler_length: 6,
        }]
    );
    assert_eq!(
        decoded(&body.code),
        vec![
            (0, OpCode::Nop, RawOperand::None),
            (1, OpCode::Leave, RawOperand::Target(12)),
            (6, OpCode::Pop, RawOperand::None),
            (7, OpCode::Leave, RawOperand::Target(12)),
            (12, OpCode::Ret, RawOperand::None),
        ]
    );
}

#[test]
fn test_finally_protects_catches() {
    let failure = TypeRef::new("Acme.Error", TypeCode::Class, 0x0100_0001);
    let mut e = Emitter::with_sink(MethodBodySink::new());
    e.begin_exception_block().unwrap();
    e.nop().unwrap();
    e.begin_catch_block(failure).unwrap().pop().unwrap();
    e.begin_finally_block().unwrap().nop().unwrap();
    e.end_exception_block().unwrap();

    let body = e.into_sink().finish().unwrap();
    let finally = body
        .clauses
        .iter()
        .find(|clause| clause.kind == ClauseKind::Finally)
        .unwrap();
    // nop, leave, pop, leave | nop, endfinally
    assert_eq!(finally.try_offset, 0);
    assert_eq!(finally.try_length, 12);
    assert_eq!(finally.handler_offset, 12);
    assert_eq!(finally.handler_length, 2);
    assert_eq!(*body.code.last().unwrap(), 0xDC);
}

#[test]
fn test_calli_signatures_interned() {
    let site = CallSite::managed(int32(), [int32(), int32()]);
    let mut e = Emitter::with_sink(MethodBodySink::new());
    e.calli(site.clone()).unwrap().calli(site).unwrap();
    let body = e.into_sink().finish().unwrap();
    assert_eq!(body.signatures.len(), 1);
    let token = SIGNATURE_TAG | 1;
    assert_eq!(
        decoded(&body.code),
        vec![
            (0, OpCode::Calli, RawOperand::Token(token)),
            (5, OpCode::Calli, RawOperand::Token(token)),
        ]
    );
}

#[test]
fn test_raw_emits_keep_stream_and_body_aligned() {
    let mut e = Emitter::with_sink(MethodBodySink::new());
    let x = e.declare_local(int32(), false, Some("x")).unwrap();

    assert!(e.emit(Instruction::Op(OpCode::Br)).is_err());
    assert!(e.emit(Instruction::Local(OpCode::Add, x.clone())).is_err());
    e.emit(Instruction::Local(OpCode::Stloc0, x)).unwrap();
    e.emit(Instruction::Op(OpCode::Ret)).unwrap();

    assert_eq!(e.stream().offset(), e.sink().offset());
    assert_eq!(e.sink().offset(), 2);
}
