//! Writing instructions by hand and reading them back

use quill_bytecode::{disassemble, BytecodeReader, BytecodeWriter, DecodeError, OpCode, RawOperand};

#[test]
fn test_every_opcode_decodes_to_itself() {
    for &opcode in OpCode::ALL {
        let (bytes, len) = opcode.encode();
        let mut reader = BytecodeReader::new(&bytes[..len]);
        assert_eq!(reader.read_opcode().unwrap(), opcode, "{opcode}");
        assert_eq!(opcode.opcode_size(), len);
    }
}

#[test]
fn test_branch_targets_are_absolute() {
    let mut writer = BytecodeWriter::new();
    writer.emit_opcode(OpCode::Nop);
    writer.emit_opcode(OpCode::BrtrueS);
    let short = writer.reserve_i8();
    writer.emit_opcode(OpCode::Leave);
    let long = writer.reserve_i32();
    writer.emit_opcode(OpCode::Ret);
    let end = writer.offset();

    writer.patch_i8(short, (end - 1 - 3) as i8);
    writer.patch_i32(long, -8);

    let decoded = disassemble(writer.buffer()).unwrap();
    assert_eq!(decoded[1].operand, RawOperand::Target(end - 1));
    assert_eq!(decoded[2].operand, RawOperand::Target(0));
    assert_eq!(decoded[3].opcode, OpCode::Ret);
}

#[test]
fn test_two_byte_opcodes_with_operands() {
    let mut writer = BytecodeWriter::new();
    writer.emit_opcode(OpCode::Ldarg);
    writer.emit_u16(300);
    writer.emit_opcode(OpCode::Unaligned);
    writer.emit_u8(4);
    writer.emit_opcode(OpCode::LdindI4);
    let decoded = disassemble(writer.buffer()).unwrap();
    assert_eq!(decoded[0].operand, RawOperand::U16(300));
    assert_eq!(decoded[1].offset, 4);
    assert_eq!(decoded[1].operand, RawOperand::U8(4));
    assert_eq!(decoded[2].offset, 7);
}

#[test]
fn test_truncated_operand_is_an_error() {
    let bytes = [OpCode::LdcI4.encode().0[0], 0x01, 0x02];
    assert!(matches!(
        disassemble(&bytes),
        Err(DecodeError::UnexpectedEnd(_))
    ));
}
