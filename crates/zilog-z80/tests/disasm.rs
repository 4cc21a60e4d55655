use rstest::rstest;
use zilog_z80::{decode, disassemble};

#[rstest]
#[case(&[0x06, 0x2A], "ld b, $2A")]
#[case(&[0x76], "halt")]
#[case(&[0x08], "ex af, af'")]
#[case(&[0x20, 0x05], "jr nz, $0007")]
#[case(&[0x2A, 0x00, 0x80], "ld hl, ($8000)")]
#[case(&[0x32, 0x00, 0x40], "ld ($4000), a")]
#[case(&[0x96], "sub (hl)")]
#[case(&[0x8E], "adc a, (hl)")]
#[case(&[0xC3, 0x34, 0x12], "jp $1234")]
#[case(&[0xC8], "ret z")]
#[case(&[0xCD, 0x00, 0x10], "call $1000")]
#[case(&[0xD3, 0x7F], "out ($7F), a")]
#[case(&[0xE3], "ex (sp), hl")]
#[case(&[0xE9], "jp (hl)")]
#[case(&[0xF9], "ld sp, hl")]
#[case(&[0xFF], "rst $38")]
#[case(&[0xCB, 0x46], "bit 0, (hl)")]
#[case(&[0xCB, 0x3F], "srl a")]
#[case(&[0xED, 0x4A], "adc hl, bc")]
#[case(&[0xED, 0x5E], "im 2")]
#[case(&[0xED, 0x70], "in (c)")]
#[case(&[0xED, 0x71], "out (c), $00")]
#[case(&[0xED, 0xB0], "ldir")]
#[case(&[0xED, 0x57], "ld a, i")]
#[case(&[0xDD, 0x7E, 0x05], "ld a, (ix+$05)")]
#[case(&[0xFD, 0x77, 0xFE], "ld (iy-$02), a")]
#[case(&[0xDD, 0x26, 0x10], "ld ixh, $10")]
#[case(&[0xDD, 0xE3], "ex (sp), ix")]
#[case(&[0xDD, 0x36, 0x01, 0x99], "ld (ix+$01), $99")]
#[case(&[0xDD, 0xCB, 0x03, 0xC0], "set 0, (ix+$03), b")]
#[case(&[0xFD, 0xCB, 0xFF, 0x7E], "bit 7, (iy-$01)")]
fn disassembles(#[case] bytes: &[u8], #[case] text: &str) {
    let mut padded = bytes.to_vec();
    padded.resize(4, 0);
    let inst = decode(&padded);
    assert_eq!(usize::from(inst.len), bytes.len());
    assert_eq!(disassemble(&inst, 0), text);
}

/// Unprefixed opcodes. `N` stands for the immediate byte, `NN` for the
/// immediate word and `E` for a relative target. Empty entries are prefixes.
#[rustfmt::skip]
const MAIN: [&str; 256] = [
    "nop", "ld bc, NN", "ld (bc), a", "inc bc",
    "inc b", "dec b", "ld b, N", "rlca",
    "ex af, af'", "add hl, bc", "ld a, (bc)", "dec bc",
    "inc c", "dec c", "ld c, N", "rrca",
    "djnz E", "ld de, NN", "ld (de), a", "inc de",
    "inc d", "dec d", "ld d, N", "rla",
    "jr E", "add hl, de", "ld a, (de)", "dec de",
    "inc e", "dec e", "ld e, N", "rra",
    "jr nz, E", "ld hl, NN", "ld (NN), hl", "inc hl",
    "inc h", "dec h", "ld h, N", "daa",
    "jr z, E", "add hl, hl", "ld hl, (NN)", "dec hl",
    "inc l", "dec l", "ld l, N", "cpl",
    "jr nc, E", "ld sp, NN", "ld (NN), a", "inc sp",
    "inc (hl)", "dec (hl)", "ld (hl), N", "scf",
    "jr c, E", "add hl, sp", "ld a, (NN)", "dec sp",
    "inc a", "dec a", "ld a, N", "ccf",
    "ld b, b", "ld b, c", "ld b, d", "ld b, e",
    "ld b, h", "ld b, l", "ld b, (hl)", "ld b, a",
    "ld c, b", "ld c, c", "ld c, d", "ld c, e",
    "ld c, h", "ld c, l", "ld c, (hl)", "ld c, a",
    "ld d, b", "ld d, c", "ld d, d", "ld d, e",
    "ld d, h", "ld d, l", "ld d, (hl)", "ld d, a",
    "ld e, b", "ld e, c", "ld e, d", "ld e, e",
    "ld e, h", "ld e, l", "ld e, (hl)", "ld e, a",
    "ld h, b", "ld h, c", "ld h, d", "ld h, e",
    "ld h, h", "ld h, l", "ld h, (hl)", "ld h, a",
    "ld l, b", "ld l, c", "ld l, d", "ld l, e",
    "ld l, h", "ld l, l", "ld l, (hl)", "ld l, a",
    "ld (hl), b", "ld (hl), c", "ld (hl), d", "ld (hl), e",
    "ld (hl), h", "ld (hl), l", "halt", "ld (hl), a",
    "ld a, b", "ld a, c", "ld a, d", "ld a, e",
    "ld a, h", "ld a, l", "ld a, (hl)", "ld a, a",
    "add a, b", "add a, c", "add a, d", "add a, e",
    "add a, h", "add a, l", "add a, (hl)", "add a, a",
    "adc a, b", "adc a, c", "adc a, d", "adc a, e",
    "adc a, h", "adc a, l", "adc a, (hl)", "adc a, a",
    "sub b", "sub c", "sub d", "sub e",
    "sub h", "sub l", "sub (hl)", "sub a",
    "sbc a, b", "sbc a, c", "sbc a, d", "sbc a, e",
    "sbc a, h", "sbc a, l", "sbc a, (hl)", "sbc a, a",
    "and b", "and c", "and d", "and e",
    "and h", "and l", "and (hl)", "and a",
    "xor b", "xor c", "xor d", "xor e",
    "xor h", "xor l", "xor (hl)", "xor a",
    "or b", "or c", "or d", "or e",
    "or h", "or l", "or (hl)", "or a",
    "cp b", "cp c", "cp d", "cp e",
    "cp h", "cp l", "cp (hl)", "cp a",
    "ret nz", "pop bc", "jp nz, NN", "jp NN",
    "call nz, NN", "push bc", "add a, N", "rst $00",
    "ret z", "ret", "jp z, NN", "",
    "call z, NN", "call NN", "adc a, N", "rst $08",
    "ret nc", "pop de", "jp nc, NN", "out (N), a",
    "call nc, NN", "push de", "sub N", "rst $10",
    "ret c", "exx", "jp c, NN", "in a, (N)",
    "call c, NN", "", "sbc a, N", "rst $18",
    "ret po", "pop hl", "jp po, NN", "ex (sp), hl",
    "call po, NN", "push hl", "and N", "rst $20",
    "ret pe", "jp (hl)", "jp pe, NN", "ex de, hl",
    "call pe, NN", "", "xor N", "rst $28",
    "ret p", "pop af", "jp p, NN", "di",
    "call p, NN", "push af", "or N", "rst $30",
    "ret m", "ld sp, hl", "jp m, NN", "ei",
    "call m, NN", "", "cp N", "rst $38",
];

/// ED $40-$7F. Everything else on the page is a block op or a two-byte nop.
#[rustfmt::skip]
const ED_LOW: [&str; 64] = [
    "in b, (c)", "out (c), b", "sbc hl, bc", "ld (NN), bc",
    "neg", "retn", "im 0", "ld i, a",
    "in c, (c)", "out (c), c", "adc hl, bc", "ld bc, (NN)",
    "neg", "reti", "im 0", "ld r, a",
    "in d, (c)", "out (c), d", "sbc hl, de", "ld (NN), de",
    "neg", "retn", "im 1", "ld a, i",
    "in e, (c)", "out (c), e", "adc hl, de", "ld de, (NN)",
    "neg", "retn", "im 2", "ld a, r",
    "in h, (c)", "out (c), h", "sbc hl, hl", "ld (NN), hl",
    "neg", "retn", "im 0", "rrd",
    "in l, (c)", "out (c), l", "adc hl, hl", "ld hl, (NN)",
    "neg", "retn", "im 0", "rld",
    "in (c)", "out (c), $00", "sbc hl, sp", "ld (NN), sp",
    "neg", "retn", "im 1", "nop",
    "in a, (c)", "out (c), a", "adc hl, sp", "ld sp, (NN)",
    "neg", "retn", "im 2", "nop",
];

#[rustfmt::skip]
const BLOCK: [(u8, &str); 16] = [
    (0xA0, "ldi"), (0xA1, "cpi"), (0xA2, "ini"), (0xA3, "outi"),
    (0xA8, "ldd"), (0xA9, "cpd"), (0xAA, "ind"), (0xAB, "outd"),
    (0xB0, "ldir"), (0xB1, "cpir"), (0xB2, "inir"), (0xB3, "otir"),
    (0xB8, "lddr"), (0xB9, "cpdr"), (0xBA, "indr"), (0xBB, "otdr"),
];

const ROTATES: [&str; 8] = ["rlc", "rrc", "rl", "rr", "sla", "sra", "sll", "srl"];
const REGISTERS: [&str; 8] = ["b", "c", "d", "e", "h", "l", "(hl)", "a"];

/// Operand bytes a template reads after its opcode.
fn operand_bytes(template: &str) -> usize {
    if template.contains("NN") {
        2
    } else if template.contains(['N', 'E']) {
        1
    } else {
        0
    }
}

/// Template text for operand bytes $12 $34, at address 0.
fn fill(template: &str, len: usize) -> String {
    template
        .replace("NN", "$3412")
        .replace('N', "$12")
        .replace('E', &format!("${:04X}", len + 0x12))
}

/// Decode `bytes` followed by $12 $34 $56.
fn check(bytes: &[u8], text: &str, len: usize) {
    let mut padded = bytes.to_vec();
    padded.extend_from_slice(&[0x12, 0x34, 0x56]);
    let inst = decode(&padded);
    assert_eq!(disassemble(&inst, 0), text, "{bytes:02X?}");
    assert_eq!(usize::from(inst.len), len, "{bytes:02X?} length");
}

#[test]
fn main_page() {
    for (op, template) in (0..=255u8).zip(MAIN) {
        if template.is_empty() {
            continue;
        }
        let len = 1 + operand_bytes(template);
        check(&[op], &fill(template, len), len);
    }
}

/// Main-page text under a DD/FD prefix: `(hl)` gains a displacement, and
/// otherwise HL, H and L are renamed.
fn indexed(op: u8, template: &str, index: &str) -> (String, usize) {
    let len = 2 + operand_bytes(template);
    match op {
        0xE9 => return (format!("jp ({index})"), len),
        0xEB => return (template.to_string(), len),
        _ => {}
    }
    if template.contains("(hl)") {
        let text = template.replace("(hl)", &format!("({index}+$12)")).replace('N', "$34");
        return (text, len + 1);
    }
    let (mnemonic, operands) = template.split_once(' ').unwrap_or((template, ""));
    let renamed: Vec<String> = operands
        .split(", ")
        .filter(|o| !o.is_empty())
        .map(|o| match o {
            "hl" => index.to_string(),
            "h" | "l" => format!("{index}{o}"),
            other => other.to_string(),
        })
        .collect();
    let text = if renamed.is_empty() {
        mnemonic.to_string()
    } else {
        format!("{mnemonic} {}", renamed.join(", "))
    };
    (fill(&text, len), len)
}

#[rstest]
#[case(0xDD, "ix")]
#[case(0xFD, "iy")]
fn index_page(#[case] prefix: u8, #[case] index: &str) {
    for (op, template) in (0..=255u8).zip(MAIN) {
        match op {
            0xCB => {}
            0xDD | 0xED | 0xFD => check(&[prefix, op], "nop", 1),
            _ => {
                let (text, len) = indexed(op, template, index);
                check(&[prefix, op], &text, len);
            }
        }
    }
}

fn bit_op(op: u8, target: &str) -> String {
    let y = usize::from((op >> 3) & 7);
    match op >> 6 {
        0 => format!("{} {target}", ROTATES[y]),
        1 => format!("bit {y}, {target}"),
        2 => format!("res {y}, {target}"),
        _ => format!("set {y}, {target}"),
    }
}

#[test]
fn cb_page() {
    for op in 0..=255u8 {
        check(&[0xCB, op], &bit_op(op, REGISTERS[usize::from(op & 7)]), 2);
    }
}

#[rstest]
#[case(0xDD, "ix")]
#[case(0xFD, "iy")]
fn index_cb_page(#[case] prefix: u8, #[case] index: &str) {
    for op in 0..=255u8 {
        let mut text = bit_op(op, &format!("({index}+$12)"));
        // Everything but BIT also lands in the register `z` names.
        if op >> 6 != 1 && op & 7 != 6 {
            text = format!("{text}, {}", REGISTERS[usize::from(op & 7)]);
        }
        check(&[prefix, 0xCB, 0x12, op], &text, 4);
    }
}

#[test]
fn ed_page() {
    for op in 0..=255u8 {
        let (text, len) = match op {
            0x40..=0x7F => {
                let template = ED_LOW[usize::from(op - 0x40)];
                let len = 2 + operand_bytes(template);
                (fill(template, len), len)
            }
            _ => match BLOCK.iter().find(|(code, _)| *code == op) {
                Some((_, name)) => ((*name).to_string(), 2),
                None => ("nop".to_string(), 2),
            },
        };
        check(&[0xED, op], &text, len);
    }
}
