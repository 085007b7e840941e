//! Optimization pass scenarios and pipeline properties.

use vec4c::core::DeviceInfo;
use vec4c::ir::{CondMod, Instruction, Opcode, RegFile};
use vec4c::opt::{self, cmod, coalesce, dce, PASSES};
use vec4c::test_ir::{parse_program, print_instructions};
use vec4c::{CompilationSession, Shader};

fn shader(text: &str) -> Shader {
    let _ = env_logger::builder().is_test(true).try_init();
    let program = parse_program(text).unwrap_or_else(|e| panic!("{e}"));
    Shader::new(DeviceInfo::gen7(), program).unwrap()
}

fn printed(shader: &Shader) -> String {
    print_instructions(&shader.instructions())
}

const LOOP: &str = "\
mov vgrf0:f, attr0:f
mov vgrf1:f, 0.0f
do
  cmp.ge null:f, vgrf1:f, attr1:f
  (+f0) break
  add vgrf1:f, vgrf1:f, vgrf0:f
  mov vgrf3:f, vgrf1:f
  (+f0) if
    mul vgrf2:f, vgrf3:f, 2.0f
  else
    mov vgrf2:f, vgrf0.xxxx:f
  endif
  add vgrf0:f, vgrf0:f, vgrf2:f
while
mov m1:f, vgrf0:f
urb_write null:ud, m0:ud mlen=2 base_mrf=0
";

const REDUNDANT: &str = "\
mov vgrf0:f, attr0:f
add vgrf1:f, vgrf0:f, attr1:f
add vgrf2:f, attr1:f, vgrf0:f
mul vgrf3:f, vgrf1:f, vgrf2:f
mov m1:f, vgrf3:f
urb_write null:ud, m0:ud mlen=2 base_mrf=0
";

const COPIES: &str = "\
mul vgrf0:f, attr0:f, attr1:f
mov vgrf1:f, vgrf0:f
add vgrf2:f, vgrf1:f, attr0:f
mov vgrf3:f, vgrf2:f
mul vgrf4:f, vgrf3:f, vgrf1:f
mov m1:f, vgrf4:f
";

#[test]
fn compare_against_zero_fuses_into_producer() {
    let mut shader = shader(
        "\
add vgrf0:f, attr0:f, attr1:f
cmp.ge null.x:f, vgrf0:f, 0.0f
(+f0) mov m1.x:f, attr0:f
mov m2:f, vgrf0:f
",
    );
    assert!(cmod::run(&mut shader).unwrap());
    assert_eq!(
        printed(&shader),
        "add.ge vgrf0:f, attr0:f, attr1:f\n(+f0) mov m1.x:f, attr0:f\nmov m2:f, vgrf0:f\n"
    );
}

#[test]
fn partial_producer_blocks_fusion() {
    let text = "\
add vgrf0.x:f, attr0:f, attr1:f
cmp.ge null:f, vgrf0:f, 0.0f
(+f0) mov m1:f, attr0:f
mov m2:f, vgrf0.xxxx:f
";
    let mut shader = shader(text);
    let before = shader.instructions();
    assert!(!cmod::run(&mut shader).unwrap());
    assert_eq!(shader.instructions(), before);
    assert_eq!(printed(&shader), text);
}

#[test]
fn unread_comparison_is_deleted() {
    let mut shader = shader(
        "\
cmp.ge vgrf0:f, attr0:f, attr1:f
cmp.l null:f, attr1:f, attr0:f
mov m1:f, attr0:f
",
    );
    assert!(dce::run(&mut shader).unwrap());
    assert_eq!(printed(&shader), "mov m1:f, attr0:f\n");
}

#[test]
fn read_flag_keeps_comparison_without_result() {
    let mut shader = shader(
        "\
cmp.ge vgrf0:f, attr0:f, attr1:f
(+f0) mov m1:f, attr0:f
",
    );
    assert!(dce::run(&mut shader).unwrap());
    let insts = shader.instructions();
    assert_eq!(insts.len(), 2);
    assert!(insts[0].dst.is_null());
    assert_eq!(insts[0].cmod, CondMod::Ge);
}

#[test]
fn product_coalesces_into_message_register() {
    let mut shader = shader(
        "\
mul vgrf0:f, attr0:f, attr1:f
mov m1:f, vgrf0:f
urb_write null:ud, m0:ud mlen=2 base_mrf=0
",
    );
    assert!(coalesce::run(&mut shader).unwrap());
    assert_eq!(
        printed(&shader),
        "mul m1:f, attr0:f, attr1:f\nurb_write null:ud, m0:ud mlen=2 base_mrf=0\n"
    );
}

#[test]
fn coalescing_never_extends_live_ranges() {
    let mut shader = shader(COPIES);
    let before_len = shader.num_instructions();
    let before = shader.live();
    let mut rounds = 0;
    while coalesce::run(&mut shader).unwrap() {
        rounds += 1;
        assert!(rounds < 8, "coalescing does not converge");
    }
    assert!(rounds > 0);
    assert!(shader.num_instructions() <= before_len);
    assert_eq!(shader.num_instructions(), 3);

    let after = shader.live();
    for (nr, _) in shader.alloc.iter() {
        let Some((start, end)) = after.vgrf_range(nr) else {
            continue;
        };
        let (old_start, old_end) = before
            .vgrf_range(nr)
            .unwrap_or_else(|| panic!("vgrf{nr} was not live before coalescing"));
        assert!(end - start <= old_end - old_start, "vgrf{nr} grew from {old_start}..={old_end} to {start}..={end}");
    }
    let last = shader.instructions().pop().unwrap();
    assert_eq!(last.opcode, Opcode::Mul);
    assert_eq!(last.dst.file, RegFile::Mrf);
}

#[test]
fn every_pass_is_idempotent() {
    for text in [LOOP, REDUNDANT, COPIES] {
        for (name, pass) in PASSES {
            let mut shader = shader(text);
            let mut runs = 0;
            while pass(&mut shader).unwrap() {
                runs += 1;
                assert!(runs < 16, "{name} keeps reporting progress");
            }
            let settled = shader.instructions();
            assert!(!pass(&mut shader).unwrap(), "{name} made progress after settling");
            assert_eq!(shader.instructions(), settled, "{name} changed the program without reporting it");
        }
    }
}

#[test]
fn pipeline_reaches_a_fixed_point() {
    for text in [LOOP, REDUNDANT, COPIES] {
        let mut shader = shader(text);
        let mut session = CompilationSession::new();
        let rounds = opt::optimize(&mut shader, &mut session).unwrap();
        assert!(rounds >= 1 && rounds < opt::MAX_ROUNDS);
        for (name, pass) in PASSES {
            assert!(!pass(&mut shader).unwrap(), "{name} made progress after the fixed point");
        }
    }
}

#[test]
fn copies_and_repeated_expressions_disappear() {
    let mut shader = shader(REDUNDANT);
    let mut session = CompilationSession::new();
    opt::optimize(&mut shader, &mut session).unwrap();

    let insts = shader.instructions();
    assert_eq!(insts.len(), 3, "{}", printed(&shader));
    assert_eq!(insts.iter().filter(|i| i.opcode == Opcode::Add).count(), 1);
    assert!(insts.iter().all(|i| i.opcode != Opcode::Mov));

    let add = &insts[0];
    assert_eq!(add.src[0].file, RegFile::Attr);
    let mul: &Instruction = &insts[1];
    assert_eq!(mul.opcode, Opcode::Mul);
    assert_eq!(mul.dst.file, RegFile::Mrf);
    assert_eq!(mul.src[0], mul.src[1]);
    assert_eq!(mul.src[0].nr, add.dst.nr);
}

#[test]
fn loop_program_keeps_its_structure() {
    let mut shader = shader(LOOP);
    let mut session = CompilationSession::new();
    opt::optimize(&mut shader, &mut session).unwrap();
    let insts = shader.instructions();
    for op in [Opcode::Do, Opcode::Break, Opcode::If, Opcode::Else, Opcode::Endif, Opcode::While] {
        assert_eq!(insts.iter().filter(|i| i.opcode == op).count(), 1, "{op}");
    }
    // The copy into vgrf3 is propagated into the multiply.
    assert!(insts.iter().all(|i| i.dst.nr != 3 || i.dst.file != RegFile::Vgrf));
    assert!(session.stats().opt_rounds >= 2);
}
