//! Register allocation properties: disjoint registers for interfering
//! values, spill-and-retry convergence and bounded spilling.

use vec4c::core::DeviceInfo;
use vec4c::ir::RegFile;
use vec4c::lower::{payload, validate};
use vec4c::regalloc;
use vec4c::test_ir::parse_program;
use vec4c::{CompilationSession, CompileError, CompileOptions, Shader, Vec4Compiler};

/// Five products of one input, all live when the first sum is formed.
const PRESSURE: &str = "\
mul vgrf0:f, attr0:f, 2.0f
mul vgrf1:f, attr0:f, 3.0f
mul vgrf2:f, attr0:f, 4.0f
mul vgrf3:f, attr0:f, 5.0f
mul vgrf4:f, attr0:f, 6.0f
add vgrf5:f, vgrf0:f, vgrf1:f
add vgrf5:f, vgrf5:f, vgrf2:f
add vgrf5:f, vgrf5:f, vgrf3:f
add vgrf5:f, vgrf5:f, vgrf4:f
mov m1:f, vgrf5:f
urb_write null:ud, m0:ud mlen=2 base_mrf=0
";

const WIDE: &str = "\
.decl vgrf4 size=2
mov vgrf0:f, attr0:f
mul vgrf1:f, vgrf0:f, attr1:f
mov vgrf4:f, vgrf1:f
mov vgrf4+32:f, vgrf0:f
add vgrf2:f, vgrf4:f, vgrf4+32:f
mul vgrf3:f, vgrf2:f, vgrf1:f
mov m1:f, vgrf3:f
mov m2:f, vgrf4+32:f
urb_write null:ud, m0:ud mlen=3 base_mrf=0
";

const LOOP: &str = "\
mov vgrf0:f, attr0:f
mov vgrf1:f, 0.0f
do
  cmp.ge null:f, vgrf1:f, attr1:f
  (+f0) break
  add vgrf1:f, vgrf1:f, vgrf0:f
  (+f0) if
    mul vgrf2:f, vgrf1:f, 2.0f
  else
    mov vgrf2:f, vgrf0.xxxx:f
  endif
  add vgrf0:f, vgrf0:f, vgrf2:f
while
mov m1:f, vgrf0:f
urb_write null:ud, m0:ud mlen=2 base_mrf=0
";

/// Writes g3 directly while two products are live.
const FIXED_WRITE: &str = "\
mul vgrf0:f, attr0:f, 2.0f
mul vgrf1:f, attr0:f, 3.0f
mov g3:f, attr0:f
add vgrf2:f, vgrf0:f, vgrf1:f
mov m1:f, vgrf2:f
mov m2:f, g3:f
urb_write null:ud, m0:ud mlen=3 base_mrf=0
";

fn prepared(devinfo: DeviceInfo, text: &str) -> Shader {
    let _ = env_logger::builder().is_test(true).try_init();
    let program = parse_program(text).unwrap_or_else(|e| panic!("{e}"));
    let mut shader = Shader::new(devinfo, program).unwrap();
    payload::run(&mut shader).unwrap();
    shader
}

fn assert_disjoint_allocation(devinfo: DeviceInfo, text: &str) {
    let mut shader = prepared(devinfo.clone(), text);
    let live = shader.live();
    let sizes: Vec<u32> = shader.alloc.iter().map(|(_, size)| size).collect();
    let mut session = CompilationSession::new();
    let alloc = regalloc::allocate(&mut shader, &mut session, false).unwrap();
    assert_eq!(session.stats().spill_iterations, 0);

    let range = |nr: usize| alloc.hw_reg[nr]..alloc.hw_reg[nr] + sizes[nr];
    for a in 0..sizes.len() {
        let ra = range(a);
        assert!(ra.start >= shader.first_non_payload_grf, "vgrf{a} overlaps the payload");
        assert!(ra.end <= devinfo.allocatable_grf_count(), "vgrf{a} is past the register file");
        for b in 0..a {
            if live.vgrfs_interfere(a as u32, b as u32) {
                let rb = range(b);
                assert!(
                    ra.end <= rb.start || rb.end <= ra.start,
                    "vgrf{a} at {ra:?} and vgrf{b} at {rb:?} interfere"
                );
            }
        }
    }

    let insts = shader.instructions();
    assert!(insts.iter().all(|i| i.dst.file != RegFile::Vgrf && i.srcs().all(|s| s.file != RegFile::Vgrf)));
    validate::run(&devinfo, &insts).unwrap();
    assert!(alloc.grf_used <= devinfo.grf_count);
}

#[test]
fn interfering_values_never_share_registers() {
    for devinfo in [DeviceInfo::gen6(), DeviceInfo::gen7(), DeviceInfo::gen8()] {
        for text in [PRESSURE, WIDE, LOOP] {
            assert_disjoint_allocation(devinfo.clone(), text);
        }
    }
}

#[test]
fn one_value_too_many_takes_one_spill() {
    // r0 and one attribute leave four registers for five live products.
    let devinfo = DeviceInfo::gen6().with_grf_count(6);
    let program = parse_program(PRESSURE).unwrap();
    let mut compiler = Vec4Compiler::new(devinfo.clone());
    let compiled = compiler.compile(program).unwrap();

    assert_eq!(compiled.first_non_payload_grf, 2);
    assert_eq!(compiled.stats.spill_iterations, 1);
    assert_eq!(compiled.stats.spilled_vgrfs, vec![2]);
    assert_eq!(compiled.stats.allocation_attempts, 2);
    assert!(compiled.scratch_bytes > 0);
    assert!(compiled.grf_used <= 6);
    validate::run(&devinfo, &compiled.instructions).unwrap();
}

#[test]
fn enough_registers_need_no_spill() {
    let program = parse_program(PRESSURE).unwrap();
    let mut compiler = Vec4Compiler::new(DeviceInfo::gen6().with_grf_count(7));
    let compiled = compiler.compile(program).unwrap();
    assert_eq!(compiled.stats.spill_iterations, 0);
    assert_eq!(compiled.stats.allocation_attempts, 1);
    assert_eq!(compiled.scratch_bytes, 0);
}

#[test]
fn spilling_is_bounded_by_spillable_registers() {
    let spillable = parse_program(PRESSURE).unwrap().alloc.len() as u32;
    for grf_count in 3..=8 {
        let program = parse_program(PRESSURE).unwrap();
        let mut compiler = Vec4Compiler::new(DeviceInfo::gen6().with_grf_count(grf_count));
        match compiler.compile(program) {
            Ok(compiled) => assert!(compiled.stats.spill_iterations <= spillable, "{grf_count} registers"),
            Err(CompileError::OutOfRegisters { spill_iterations, available, .. }) => {
                assert!(spill_iterations <= spillable, "{grf_count} registers");
                assert_eq!(available, grf_count - 2);
            }
            Err(e) => panic!("{grf_count} registers: {e}"),
        }
    }
}

#[test]
fn out_of_registers_is_reported() {
    let program = parse_program(PRESSURE).unwrap();
    let err = Vec4Compiler::new(DeviceInfo::gen6().with_grf_count(3))
        .compile(program)
        .unwrap_err();
    assert!(matches!(err, CompileError::OutOfRegisters { available: 1, .. }), "{err}");
    assert!(err.to_string().starts_with("out of registers"));
}

#[test]
fn named_physical_registers_are_never_assigned() {
    let mut shader = prepared(DeviceInfo::gen6(), FIXED_WRITE);
    let mut session = CompilationSession::new();
    let alloc = regalloc::allocate(&mut shader, &mut session, false).unwrap();
    assert!(!alloc.hw_reg.contains(&3), "{:?}", alloc.hw_reg);

    let options = CompileOptions {
        optimize: false,
        split_registers: false,
    };
    let devinfo = DeviceInfo::gen6();
    let compiled = Vec4Compiler::with_options(devinfo.clone(), options)
        .compile(parse_program(FIXED_WRITE).unwrap())
        .unwrap();
    let writes_g3 = compiled
        .instructions
        .iter()
        .filter(|i| i.dst.file == RegFile::Fixed && i.dst.nr == 3)
        .count();
    assert_eq!(writes_g3, 1);
    validate::run(&devinfo, &compiled.instructions).unwrap();
}

