//! Predecoder tests driven by JSON vectors in `tests/data/`.

use emu_alto::microcode::MicroInstruction;
use emu_alto::SystemType;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct Vector {
    name: String,
    /// Hex string, e.g. "0xABD16AA5".
    mir: String,
    task: u8,
    rsel: u8,
    aluf: u8,
    bs: u8,
    f1: u8,
    f2: u8,
    load_t: bool,
    load_l: bool,
    next: u16,
    use_constant: bool,
    bs_use_crom: bool,
    const_addr: u8,
    load_t_from_alu: bool,
}

#[test]
fn decode_vectors() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/decode_vectors.json");
    let data = fs::read_to_string(&path).expect("vector file");
    let vectors: Vec<Vector> = serde_json::from_str(&data).expect("vector JSON");
    assert!(!vectors.is_empty());

    for v in vectors {
        let mir = u32::from_str_radix(v.mir.trim_start_matches("0x"), 16).expect("hex mir");
        let mc = MicroInstruction::predecode(SystemType::AltoII3KRam, 0, mir, v.task)
            .unwrap_or_else(|e| panic!("{}: {e}", v.name));
        assert_eq!(mc.rsel, v.rsel, "{}: rsel", v.name);
        assert_eq!(mc.aluf, v.aluf, "{}: aluf", v.name);
        assert_eq!(mc.bs, v.bs, "{}: bs", v.name);
        assert_eq!(mc.f1, v.f1, "{}: f1", v.name);
        assert_eq!(mc.f2, v.f2, "{}: f2", v.name);
        assert_eq!(mc.load_t, v.load_t, "{}: load_t", v.name);
        assert_eq!(mc.load_l, v.load_l, "{}: load_l", v.name);
        assert_eq!(mc.next, v.next, "{}: next", v.name);
        assert_eq!(mc.use_constant, v.use_constant, "{}: use_constant", v.name);
        assert_eq!(mc.bs_use_crom, v.bs_use_crom, "{}: bs_use_crom", v.name);
        assert_eq!(mc.const_addr, v.const_addr, "{}: const_addr", v.name);
        assert_eq!(
            mc.load_t_from_alu, v.load_t_from_alu,
            "{}: load_t_from_alu",
            v.name
        );
    }
}
