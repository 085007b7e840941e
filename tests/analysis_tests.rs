//! Control-flow graph and liveness checks on text IR programs.

use vec4c::analysis::{visit_dst_vars, visit_src_vars};
use vec4c::core::DeviceInfo;
use vec4c::opt;
use vec4c::test_ir::parse_program;
use vec4c::{CompilationSession, Shader};

const LOOP: &str = "\
mov vgrf0:f, attr0:f
mov vgrf1:f, 0.0f
do
  cmp.ge null:f, vgrf1:f, attr1:f
  (+f0) break
  add vgrf1:f, vgrf1:f, vgrf0:f
  cmp.l null:f, vgrf1:f, 1.0f
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

fn shader(text: &str) -> Shader {
    let _ = env_logger::builder().is_test(true).try_init();
    let program = parse_program(text).unwrap_or_else(|e| panic!("{e}"));
    Shader::new(DeviceInfo::gen7(), program).unwrap()
}

/// Every variable read is either live into its block or written earlier in
/// the same block.
fn assert_liveness_sound(shader: &mut Shader) {
    let live = shader.live();
    for (b, block) in shader.cfg.blocks.iter().enumerate() {
        let mut defined = vec![false; live.num_vars()];
        for inst in &block.instructions {
            for i in 0..inst.num_srcs() {
                visit_src_vars(&shader.alloc, inst, i, |v| {
                    assert!(
                        defined[v] || live.blocks[b].livein.contains(v),
                        "variable {v} read by `{inst}` in block {b} is neither defined nor live in"
                    );
                });
            }
            visit_dst_vars(&shader.alloc, inst, |v| defined[v] = true);
        }
    }
}

#[test]
fn nested_branches_inside_a_loop() {
    let shader = shader(
        "\
mov vgrf0:f, attr0:f
do
  cmp.ge null:f, vgrf0:f, attr1:f
  (+f0) if
    (+f0) break
  else
    add vgrf0:f, vgrf0:f, 1.0f
    (+f0) continue
  endif
  mul vgrf0:f, vgrf0:f, 2.0f
while
mov m1:f, vgrf0:f
",
    );
    let cfg = &shader.cfg;
    // b0: mov | b1: do cmp if | b2: break | b3: else | b4: add continue
    // b5: endif mul while | b6: mov
    assert_eq!(cfg.num_blocks(), 7);
    assert_eq!(cfg.blocks[0].succs, vec![1]);
    assert_eq!(cfg.blocks[1].succs, vec![2, 4]);
    assert_eq!(cfg.blocks[2].succs, vec![6, 3]);
    assert_eq!(cfg.blocks[3].succs, vec![5]);
    assert_eq!(cfg.blocks[4].succs, vec![1, 5]);
    assert_eq!(cfg.blocks[5].succs, vec![1]);
    assert!(cfg.blocks[6].succs.is_empty());

    assert_eq!(cfg.blocks[1].preds, vec![0, 4, 5]);
    assert_eq!(cfg.blocks[5].preds, vec![3, 4]);
    assert_eq!(cfg.blocks[6].preds, vec![2]);

    let depths: Vec<u32> = cfg.blocks.iter().map(|b| b.loop_depth).collect();
    assert_eq!(depths, vec![0, 1, 1, 1, 1, 1, 0]);
    assert_eq!(cfg.block_of(9), Some(5));
    assert_eq!(cfg.num_instructions(), 12);
}

#[test]
fn unbalanced_structure_is_malformed() {
    let program = parse_program("do\n(+f0) if\nwhile\nendif\n").unwrap();
    let err = Shader::new(DeviceInfo::gen7(), program).err().unwrap();
    assert!(err.to_string().starts_with("malformed IR"), "{err}");
}

#[test]
fn liveness_is_sound_across_loops_and_branches() {
    let mut shader = shader(LOOP);
    assert_liveness_sound(&mut shader);

    let live = shader.live();
    // The accumulated value is read at the top of the next iteration, so it
    // stays live over the whole loop.
    let (start, end) = live.vgrf_range(0).unwrap();
    assert_eq!(start, 0);
    assert!(end >= 13, "vgrf0 range ends at {end}");
    assert!(live.vgrfs_interfere(0, 1));
}

#[test]
fn liveness_stays_sound_after_optimization() {
    let mut shader = shader(LOOP);
    let mut session = CompilationSession::new();
    opt::optimize(&mut shader, &mut session).unwrap();
    assert_liveness_sound(&mut shader);
}

#[test]
fn swizzled_reads_use_only_selected_lanes() {
    let mut shader = shader(
        "\
mov vgrf0.x:f, attr0:f
mov vgrf1:f, vgrf0.xxxx:f
mov m1:f, vgrf1:f
",
    );
    assert_liveness_sound(&mut shader);
    let live = shader.live();
    // Only lane x of vgrf0 is ever live.
    assert!(live.var_range(0).is_some());
    for lane in 1..4 {
        assert!(live.var_range(lane).is_none(), "lane {lane}");
    }
}
