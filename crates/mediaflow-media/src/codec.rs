//! Human readable codec names.

/// Display name for a probe codec identifier. Unknown codecs are uppercased.
pub fn codec_display_name(codec: &str) -> String {
    let name = match codec {
        "h264" => "H.264/AVC",
        "hevc" => "H.265/HEVC",
        "prores" => "Apple ProRes",
        "dnxhd" => "Avid DNxHD",
        "mjpeg" => "Motion JPEG",
        "aac" => "AAC",
        "pcm_s16le" | "pcm_s24le" => "PCM",
        "mp3" => "MP3",
        "flac" => "FLAC",
        "vorbis" => "Vorbis",
        other => return other.to_uppercase(),
    };
    name.to_string()
}
