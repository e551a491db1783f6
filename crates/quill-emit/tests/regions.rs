//! Exception region sequencing, raw and through `TryBlock`

use quill_emit::{
    Emit, EmitResult, Emitter, HandlerKind, Instruction, OpCode, Operations, Pseudo, RegionPhase,
    SymbolScope, TypeCode, TypeRef,
};

fn exception(name: &str, token: u32) -> TypeRef {
    TypeRef::new(name, TypeCode::Class, token)
}

#[test]
fn test_catch_catch_finally_closes_region() {
    let mut e = Emitter::new();
    let region = e.begin_exception_block().unwrap();
    assert_eq!(e.regions().current().unwrap().phase(), RegionPhase::Try);
    e.nop().unwrap();
    e.begin_catch_block(exception("Acme.IoError", 0x0100_0001)).unwrap();
    e.pop().unwrap();
    e.begin_catch_block(exception("Acme.Error", 0x0100_0002)).unwrap();
    assert_eq!(e.regions().current().unwrap().phase(), RegionPhase::Catch);
    e.pop().unwrap();
    e.begin_finally_block().unwrap();
    e.nop().unwrap();
    e.end_exception_block().unwrap();

    assert!(e.regions().is_empty());
    // nop, leave, pop, leave, pop, leave, nop, endfinally
    assert_eq!(e.labels().position(&region), Some(1 + 5 + 1 + 5 + 1 + 5 + 1 + 1));
    let last = &e.stream().lines().last().unwrap().instruction;
    assert_eq!(
        *last,
        Instruction::Pseudo(Pseudo::EndExceptionBlock {
            region,
            handler: HandlerKind::Finally,
        })
    );
}

#[test]
fn test_catch_after_finally_rejected() {
    let mut e = Emitter::new();
    e.begin_exception_block().unwrap();
    e.begin_finally_block().unwrap();
    let before = e.stream().len();
    let err = e
        .begin_catch_block(exception("Acme.Error", 0x0100_0002))
        .unwrap_err();
    assert!(err.is_sequencing());
    assert_eq!(e.stream().len(), before);
    assert_eq!(e.regions().current().unwrap().phase(), RegionPhase::Finally);
}

#[test]
fn test_handlers_need_open_region() {
    let mut e = Emitter::new();
    assert!(e
        .begin_catch_block(exception("Acme.Error", 0x0100_0002))
        .unwrap_err()
        .is_sequencing());
    assert!(e.begin_finally_block().unwrap_err().is_sequencing());
    assert!(e.begin_fault_block().unwrap_err().is_sequencing());
    assert!(e.end_exception_block().unwrap_err().is_sequencing());
    assert!(e.stream().is_empty());
}

#[test]
fn test_end_without_handler_rejected() {
    let mut e = Emitter::new();
    e.begin_exception_block().unwrap();
    assert!(e.end_exception_block().unwrap_err().is_sequencing());
    assert_eq!(e.regions().depth(), 1);
}

#[test]
fn test_nested_regions_close_inner_first() {
    let mut e = Emitter::new();
    let outer = e.begin_exception_block().unwrap();
    let inner = e.begin_exception_block().unwrap();
    e.begin_fault_block().unwrap();
    e.end_exception_block().unwrap();
    assert_eq!(e.regions().current().unwrap().label(), &outer);
    assert!(e.labels().is_marked(&inner));
    assert!(!e.labels().is_marked(&outer));
    e.begin_finally_block().unwrap();
    e.end_exception_block().unwrap();
    assert!(e.regions().is_empty());
}

fn guarded(e: &mut Emitter) -> EmitResult<()> {
    let io = exception("Acme.IoError", 0x0100_0001);
    let any = exception("Acme.Error", 0x0100_0002);
    e.try_block(|e| {
        e.ldarg(0)?.pop()?;
        Ok(())
    })?
    .catch(io, |e| {
        e.pop()?;
        Ok(())
    })?
    .catch(any, |e| {
        e.pop()?.rethrow()?;
        Ok(())
    })?
    .finally(|e| {
        e.nop()?;
        Ok(())
    })?
    .ret()?;
    Ok(())
}

#[test]
fn test_try_block_matches_raw_calls() {
    let mut built = Emitter::new();
    guarded(&mut built).unwrap();

    let mut raw = Emitter::new();
    raw.begin_exception_block().unwrap();
    raw.ldarg(0).unwrap().pop().unwrap();
    raw.begin_catch_block(exception("Acme.IoError", 0x0100_0001))
        .unwrap()
        .pop()
        .unwrap();
    raw.begin_catch_block(exception("Acme.Error", 0x0100_0002))
        .unwrap()
        .pop()
        .unwrap()
        .rethrow()
        .unwrap();
    raw.begin_finally_block().unwrap().nop().unwrap();
    raw.end_exception_block().unwrap().ret().unwrap();

    assert_eq!(built.render(), raw.render());
    assert!(built.regions().is_empty());
}

#[test]
fn test_try_block_end_after_catches() {
    let mut e = Emitter::new();
    let block = e
        .try_block(|e| {
            e.nop()?;
            Ok(())
        })
        .unwrap();
    let region = block.region().clone();
    block
        .catch(exception("Acme.Error", 0x0100_0002), |e| {
            e.pop()?;
            Ok(())
        })
        .unwrap()
        .end()
        .unwrap();
    // nop, leave, pop, leave
    assert_eq!(e.labels().position(&region), Some(12));
}

#[test]
fn test_try_block_rejects_open_nested_region() {
    let mut e = Emitter::new();
    let err = e
        .try_block(|e| {
            e.begin_exception_block()?;
            Ok(())
        })
        .unwrap()
        .fault(|e| {
            e.nop()?;
            Ok(())
        })
        .unwrap_err();
    assert!(err.is_sequencing());
    assert_eq!(e.regions().depth(), 2);
}

#[test]
fn test_leave_open_hands_back_emitter() {
    let mut e = Emitter::new();
    e.try_block(|e| {
        e.nop()?;
        Ok(())
    })
    .unwrap()
    .leave_open()
    .begin_fault_block()
    .unwrap()
    .end_exception_block()
    .unwrap();
    assert!(e.regions().is_empty());
    let ops: Vec<_> = e.stream().iter().filter_map(Instruction::opcode).collect();
    assert_eq!(ops, vec![OpCode::Nop]);
}

#[test]
fn test_raw_region_markers_refused() {
    let mut e = Emitter::new();
    let label = e.define_label(None).unwrap();
    let before = e.stream().len();

    let err = e
        .emit(Pseudo::BeginFinally { region: label.clone() }.into())
        .unwrap_err();
    assert!(err.is_sequencing());
    assert!(e.emit(Pseudo::EndScope.into()).unwrap_err().is_sequencing());
    assert!(e.emit(Pseudo::BeginScope.into()).unwrap_err().is_sequencing());
    assert!(e
        .emit(Pseudo::BeginExceptionBlock(label.clone()).into())
        .unwrap_err()
        .is_sequencing());
    assert_eq!(e.stream().len(), before);
    assert!(e.regions().is_empty());
    assert_eq!(e.scope_depth(), 0);

    let region = e.begin_exception_block().unwrap();
    let err = e
        .emit(
            Pseudo::EndExceptionBlock {
                region: region.clone(),
                handler: HandlerKind::Finally,
            }
            .into(),
        )
        .unwrap_err();
    assert!(err.is_sequencing());
    assert_eq!(e.regions().current().unwrap().phase(), RegionPhase::Try);
    assert!(!e.labels().is_marked(&region));

    // Symbol pseudo-ops still go through the raw path
    e.emit(Pseudo::MarkLabel(label.clone()).into()).unwrap();
    assert!(e.labels().is_marked(&label));
}
