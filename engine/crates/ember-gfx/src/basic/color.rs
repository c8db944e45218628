use glam::Vec4;

/// debug label 使用的颜色
pub struct LabelColor;
impl LabelColor {
    pub const COLOR_PASS: Vec4 = Vec4::new(0.7, 0.7, 0.7, 1.0);
}

/// 为第 `index` 个 pass 生成一个稳定且容易区分的颜色
///
/// 色相按黄金分割角递增，相邻的 pass 颜色差异最大。
pub fn identifying_color(index: usize) -> Vec4 {
    const GOLDEN_RATIO_CONJUGATE: f32 = 0.618_034;
    let hue = (index as f32 * GOLDEN_RATIO_CONJUGATE).fract();
    let rgb = hsv_to_rgb(hue, 0.45, 0.95);
    rgb.extend(1.0)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> glam::Vec3 {
    let sector = h * 6.0;
    let f = sector.fract();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector as u32 % 6 {
        0 => glam::Vec3::new(v, t, p),
        1 => glam::Vec3::new(q, v, p),
        2 => glam::Vec3::new(p, v, t),
        3 => glam::Vec3::new(p, q, v),
        4 => glam::Vec3::new(t, p, v),
        _ => glam::Vec3::new(v, p, q),
    }
}
