// Thread payload setup. The payload starts with the r0 header, followed by the push
// constants packed two vec4 slots per register, followed by one register per vertex
// attribute. Uniform and attribute operands are rewritten to the fixed registers they
// arrive in. On devices without a message register file, message registers are emulated by
// the GRFs starting at `mrf_hack_start`, so MRF operands and message bases move there.

//! Binding of payload inputs to fixed registers.

use crate::core::error::{malformed, unsupported, CompileResult};
use crate::ir::{Instruction, RegFile, Src};
use crate::shader::Shader;

/// Registers of the thread header.
pub const HEADER_REGS: u32 = 1;

/// Where each input file starts in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLayout {
    pub uniform_start: u32,
    pub attr_start: u32,
    pub first_non_payload_grf: u32,
}

fn bind_src(src: &mut Src, shader: &Shader, layout: &PayloadLayout) -> CompileResult<()> {
    if src.reladdr.is_some() && matches!(src.file, RegFile::Uniform | RegFile::Attr) {
        return Err(malformed(format!("indirect {:?} access reached payload setup", src.file)));
    }
    match src.file {
        RegFile::Uniform => {
            let slot = src.nr + src.offset / 16;
            let loc = shader
                .push_constant_loc
                .get(slot as usize)
                .copied()
                .flatten()
                .ok_or_else(|| malformed(format!("uniform u{slot} has no push-constant location")))?;
            src.file = RegFile::Fixed;
            src.nr = layout.uniform_start + loc / 2;
            src.offset = (loc % 2) * 16;
        }
        RegFile::Attr => {
            src.file = RegFile::Fixed;
            src.nr += layout.attr_start;
        }
        RegFile::Mrf if !shader.devinfo.has_mrf => {
            src.file = RegFile::Fixed;
            src.nr += shader.devinfo.mrf_hack_start;
        }
        _ => {}
    }
    Ok(())
}

fn bind(inst: &mut Instruction, shader: &Shader, layout: &PayloadLayout) -> CompileResult<()> {
    for i in 0..inst.num_srcs() {
        bind_src(&mut inst.src[i], shader, layout)?;
    }
    if !shader.devinfo.has_mrf {
        if inst.dst.file == RegFile::Mrf {
            inst.dst.file = RegFile::Fixed;
            inst.dst.nr += shader.devinfo.mrf_hack_start;
        }
        if let Some(base) = inst.base_mrf.as_mut() {
            *base += shader.devinfo.mrf_hack_start;
        }
    }
    Ok(())
}

/// Compact the push constants, lay out the payload and bind every input.
pub fn run(shader: &mut Shader) -> CompileResult<PayloadLayout> {
    let mut pushed: u32 = 0;
    for loc in shader.push_constant_loc.iter_mut().flatten() {
        *loc = pushed;
        pushed += 1;
    }
    let uniform_start = HEADER_REGS;
    let attr_start = uniform_start + pushed.div_ceil(2);
    let layout = PayloadLayout {
        uniform_start,
        attr_start,
        first_non_payload_grf: attr_start + shader.nr_attributes,
    };
    if layout.first_non_payload_grf >= shader.devinfo.allocatable_grf_count() {
        return Err(unsupported(
            format!("a payload of {} registers", layout.first_non_payload_grf),
            shader.devinfo.name,
        ));
    }
    shader.first_non_payload_grf = layout.first_non_payload_grf;
    log::debug!(
        "payload: {pushed} push constant(s), {} attribute(s), first free GRF {}",
        shader.nr_attributes,
        layout.first_non_payload_grf
    );

    let mut blocks = std::mem::take(&mut shader.cfg.blocks);
    let view: &Shader = shader;
    let result = blocks
        .iter_mut()
        .flat_map(|b| b.instructions.iter_mut())
        .try_for_each(|inst| bind(inst, view, &layout));
    shader.cfg.blocks = blocks;
    result?;
    shader.invalidate_live();
    Ok(layout)
}
