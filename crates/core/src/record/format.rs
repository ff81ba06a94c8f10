/// Returns the first encoding in `preferences` the recorder supports.
pub fn negotiate_mime<'a, F>(preferences: &'a [String], mut supported: F) -> Option<&'a str>
where
    F: FnMut(&str) -> bool,
{
    preferences
        .iter()
        .map(String::as_str)
        .find(|&mime| supported(mime))
}

/// File extension for a recorder MIME type such as `video/webm;codecs=vp9`.
pub fn container_extension(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    match essence {
        "video/webm" | "audio/webm" => "webm",
        "video/mp4" | "audio/mp4" => "mp4",
        "video/x-matroska" => "mkv",
        _ => "bin",
    }
}

/// Download name of the form `Artist - Title.webm`.
pub fn artifact_file_name(artist: &str, title: &str, mime_type: &str) -> String {
    let stem = sanitize(&format!("{} - {}", artist.trim(), title.trim()));
    format!("{stem}.{}", container_extension(mime_type))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
