//! FFmpeg video filter definitions.

use crate::filmstrip::FilmstripLayout;

/// HDR to SDR tone mapping chain (PQ/HLG BT.2020 in, BT.709 yuv420p out).
pub const FILTER_TONEMAP: &str = concat!(
    "zscale=t=linear:npl=100,",
    "format=gbrpf32le,",
    "zscale=p=bt709,",
    "tonemap=tonemap=hable:desat=0,",
    "zscale=t=bt709:m=bt709:r=tv,",
    "format=yuv420p"
);

/// Scale to fit inside `width`x`height`, then pad (centered) to exactly that size.
pub fn build_scale_filter(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = width,
        h = height
    )
}

/// Tone mapping chain as an owned filter string.
pub fn build_tonemap_filter() -> String {
    FILTER_TONEMAP.to_string()
}

/// Tone mapping followed by the letterbox scale.
pub fn build_tonemapped_scale_filter(width: u32, height: u32) -> String {
    format!("{},{}", build_tonemap_filter(), build_scale_filter(width, height))
}

/// Representative-frame thumbnail for video sources.
pub fn build_thumbnail_filter(width: u32, height: u32) -> String {
    format!("thumbnail,{}", build_scale_filter(width, height))
}

/// Frame sampling plus tiling into a single sprite.
pub fn build_filmstrip_filter(layout: &FilmstripLayout, capture_fps: f64) -> String {
    format!(
        "fps={},{},tile={}x{}",
        capture_fps,
        build_scale_filter(layout.tile_width, layout.tile_height),
        layout.columns,
        layout.rows
    )
}
