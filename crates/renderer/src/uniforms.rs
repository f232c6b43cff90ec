use crate::program::{ProgramState, UniformKind, UniformLocation};

/// Per-draw values written into the shader's uniform block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UniformValues {
    pub size: [f32; 2],
    pub src_size: [f32; 2],
    pub dst_size: [f32; 2],
    pub mouse: [f32; 2],
    pub wheel: [f32; 2],
    pub src_cover: bool,
    pub dst_cover: bool,
}

/// CPU mirror of the uniform buffer, laid out from the reflected offsets.
///
/// Names the program does not declare are skipped, so a shader that only
/// reads `mouse` still receives a valid block.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn new(program: &ProgramState) -> Self {
        Self {
            bytes: vec![0; program.block_size() as usize],
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn write(&mut self, program: &ProgramState, values: &UniformValues) {
        self.put_vec2(program, "size", values.size);
        self.put_vec2(program, "src_size", values.src_size);
        self.put_vec2(program, "dst_size", values.dst_size);
        self.put_vec2(program, "mouse", values.mouse);
        // Older effects call the accumulator `force`.
        self.put_vec2(program, "wheel", values.wheel);
        self.put_vec2(program, "force", values.wheel);
        self.put_flag(program, "src_cover", values.src_cover);
        self.put_flag(program, "dst_cover", values.dst_cover);
    }

    fn put_vec2(&mut self, program: &ProgramState, name: &str, value: [f32; 2]) {
        let Some(location) = program.location(name) else {
            return;
        };
        match location.kind {
            UniformKind::Vec2 => self.put(location, bytemuck::cast_slice(&value)),
            // Scalar declarations of a two-component value see the vertical part.
            UniformKind::Float => self.put(location, bytemuck::bytes_of(&value[1])),
            UniformKind::Int => self.put(location, bytemuck::bytes_of(&(value[1] as i32))),
        }
    }

    fn put_flag(&mut self, program: &ProgramState, name: &str, value: bool) {
        let Some(location) = program.location(name) else {
            return;
        };
        match location.kind {
            UniformKind::Int => self.put(location, bytemuck::bytes_of(&i32::from(value))),
            UniformKind::Float => {
                self.put(location, bytemuck::bytes_of(&if value { 1.0f32 } else { 0.0 }))
            }
            UniformKind::Vec2 => {
                tracing::debug!(uniform = %name, "cover flag declared as vec2; not written")
            }
        }
    }

    fn put(&mut self, location: UniformLocation, data: &[u8]) {
        let start = location.offset as usize;
        let end = start + data.len();
        if let Some(target) = self.bytes.get_mut(start..end) {
            target.copy_from_slice(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::build_program;
    use crate::types::{BUNDLED_FRAGMENT_SHADER, BUNDLED_VERTEX_SHADER};

    fn read_vec2(block: &UniformBlock, program: &ProgramState, name: &str) -> [f32; 2] {
        let offset = program.location(name).unwrap().offset as usize;
        let bytes = &block.bytes()[offset..offset + 8];
        [
            f32::from_ne_bytes(bytes[0..4].try_into().unwrap()),
            f32::from_ne_bytes(bytes[4..8].try_into().unwrap()),
        ]
    }

    fn read_i32(block: &UniformBlock, program: &ProgramState, name: &str) -> i32 {
        let offset = program.location(name).unwrap().offset as usize;
        i32::from_ne_bytes(block.bytes()[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn writes_every_declared_uniform_at_its_offset() {
        let program = build_program(BUNDLED_VERTEX_SHADER, BUNDLED_FRAGMENT_SHADER).unwrap();
        let mut block = UniformBlock::new(&program);
        block.write(
            &program,
            &UniformValues {
                size: [640.0, 480.0],
                src_size: [320.0, 200.0],
                dst_size: [0.0, 0.0],
                mouse: [-0.5, 0.25],
                wheel: [3.0, -120.0],
                src_cover: true,
                dst_cover: false,
            },
        );
        assert_eq!(read_vec2(&block, &program, "size"), [640.0, 480.0]);
        assert_eq!(read_vec2(&block, &program, "src_size"), [320.0, 200.0]);
        assert_eq!(read_vec2(&block, &program, "dst_size"), [0.0, 0.0]);
        assert_eq!(read_vec2(&block, &program, "mouse"), [-0.5, 0.25]);
        assert_eq!(read_vec2(&block, &program, "wheel"), [3.0, -120.0]);
        assert_eq!(read_i32(&block, &program, "src_cover"), 1);
        assert_eq!(read_i32(&block, &program, "dst_cover"), 0);
    }

    #[test]
    fn scalar_force_receives_vertical_component() {
        let fragment = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;
layout(std140, set = 0, binding = 0) uniform Params {
    float force;
};
void main() {
    out_color = vec4(v_uv, force, 1.0);
}
";
        let program = build_program(BUNDLED_VERTEX_SHADER, fragment).unwrap();
        let mut block = UniformBlock::new(&program);
        block.write(
            &program,
            &UniformValues {
                wheel: [7.0, 42.5],
                ..UniformValues::default()
            },
        );
        let offset = program.location("force").unwrap().offset as usize;
        let value = f32::from_ne_bytes(block.bytes()[offset..offset + 4].try_into().unwrap());
        assert_eq!(value, 42.5);
    }
}
