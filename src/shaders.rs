//! Built-in shader programs and the uniform names the scene graph writes.
//!
//! Programs are plain WGSL with a `vs_main`/`fs_main` pair. The core never
//! reads uniforms back; it writes the names below into whatever program is
//! current, so a custom program only needs to declare the ones it uses.

/// Uniform names written by the managers during traversal.
pub mod uniforms {
    pub const MODEL_MATRIX: &str = "modelMatrix";
    pub const VIEW_MATRIX: &str = "viewMatrix";
    pub const PROJECTION_MATRIX: &str = "projectionMatrix";

    pub const LIGHTING_ENABLED: &str = "lightingEnabled";
    pub const USE_VERTEX_COLOR: &str = "useVertexColor";
    pub const USE_TEXTURE: &str = "useTexture";
    pub const DIFFUSE_COLOR: &str = "diffuseColor";
    pub const AMBIENT_COLOR: &str = "ambientColor";
    pub const SPECULAR_COLOR: &str = "specularColor";
    pub const EMISSIVE_COLOR: &str = "emissiveColor";
    pub const SHININESS: &str = "shininess";
    pub const ALPHA: &str = "alpha";

    pub const LIGHT_COUNT: &str = "lightCount";
    pub const LIGHT_POSITION: &str = "lightPosition";
    pub const LIGHT_COLOR: &str = "lightColor";
    pub const LIGHT_DIRECTION: &str = "lightDirection";
    pub const LIGHT_PARAMS: &str = "lightParams";

    pub const OBJECT_ID: &str = "objectId";
    pub const SELECTION_RENDERING: &str = "selectionRendering";

    /// Name of element `index` of a light uniform array, e.g. `lightColor[2]`.
    pub fn indexed(name: &str, index: usize) -> String {
        format!("{name}[{index}]")
    }
}

/// Registry name of the built-in Phong program.
pub const DEFAULT_PROGRAM_NAME: &str = "basic";

/// Maximum number of lights the built-in program evaluates.
pub const MAX_SHADER_LIGHTS: usize = 8;

/// Built-in program: per-fragment Phong lighting with optional vertex
/// colors and texture. Uniform block layout must match `StandardUniforms`
/// in the wgpu backend.
pub const DEFAULT_PROGRAM: &str = r#"
struct Light {
    position: vec4<f32>,
    color: vec4<f32>,
    direction: vec4<f32>,
    params: vec4<f32>,
}

struct Uniforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    diffuse: vec4<f32>,
    ambient: vec4<f32>,
    specular: vec4<f32>,
    emissive: vec4<f32>,
    // x = shininess, y = alpha
    material: vec4<f32>,
    // x = lighting, y = vertex color, z = texture, w = selection rendering
    flags: vec4<u32>,
    // x = object id, y = light count
    ids: vec4<u32>,
    lights: array<Light, 8>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(1) @binding(0) var diffuse_texture: texture_2d<f32>;
@group(1) @binding(1) var diffuse_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) color: vec4<f32>,
}

@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) color: vec4<f32>,
) -> VertexOutput {
    var out: VertexOutput;
    let world = u.model * vec4<f32>(position, 1.0);
    out.world_position = world.xyz;
    out.world_normal = normalize((u.model * vec4<f32>(normal, 0.0)).xyz);
    out.clip_position = u.projection * u.view * world;
    out.uv = uv;
    out.color = color;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var base = u.diffuse;
    if (u.flags.y != 0u) {
        base = input.color;
    }
    if (u.flags.z != 0u) {
        base = base * textureSample(diffuse_texture, diffuse_sampler, input.uv);
    }
    if (u.flags.x == 0u) {
        return vec4<f32>(base.rgb + u.emissive.rgb, base.a * u.material.y);
    }

    let eye = (inverse_view_position(u.view));
    let n = normalize(input.world_normal);
    var color = u.ambient.rgb * base.rgb + u.emissive.rgb;
    for (var i = 0u; i < min(u.ids.y, 8u); i = i + 1u) {
        let light = u.lights[i];
        var l = normalize(-light.direction.xyz);
        var attenuation = 1.0;
        if (light.direction.w < 1.5) {
            let to_light = light.position.xyz - input.world_position;
            let dist = length(to_light);
            l = to_light / max(dist, 0.0001);
            attenuation = clamp(1.0 - dist / max(light.position.w, 0.0001), 0.0, 1.0);
            if (light.direction.w > 0.5) {
                let theta = dot(-l, normalize(light.direction.xyz));
                attenuation = attenuation * smoothstep(light.params.y, light.params.x, theta);
            }
        }
        let diffuse = max(dot(n, l), 0.0);
        let h = normalize(l + normalize(eye - input.world_position));
        let specular = pow(max(dot(n, h), 0.0), max(u.material.x, 1.0));
        let radiance = light.color.rgb * light.color.w * attenuation;
        color = color + radiance * (diffuse * base.rgb + specular * u.specular.rgb);
    }
    return vec4<f32>(color, base.a * u.material.y);
}

fn inverse_view_position(view: mat4x4<f32>) -> vec3<f32> {
    let r = mat3x3<f32>(view[0].xyz, view[1].xyz, view[2].xyz);
    return -(transpose(r) * view[3].xyz);
}
"#;

/// Object-id program used by buffer selection: writes `objectId` into an
/// `R32Uint` target.
pub const SELECTION_PROGRAM_NAME: &str = "selection";

pub const SELECTION_PROGRAM: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    diffuse: vec4<f32>,
    ambient: vec4<f32>,
    specular: vec4<f32>,
    emissive: vec4<f32>,
    material: vec4<f32>,
    flags: vec4<u32>,
    ids: vec4<u32>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return u.projection * u.view * u.model * vec4<f32>(position, 1.0);
}

@fragment
fn fs_main() -> @location(0) u32 {
    return u.ids.x;
}
"#;
