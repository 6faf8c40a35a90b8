// Track name normalization for data-directory lookups

/// Known track abbreviations and display names mapped to the folder names
/// the timing exports are organized under. Folder casing is preserved
/// exactly as it appears on disk.
const TRACK_FOLDERS: &[(&str, &str)] = &[
    ("barber", "barber"),
    ("indianapolis", "indianapolis"),
    ("indy", "indianapolis"),
    ("indianapolis motor speedway", "indianapolis"),
    ("road-america", "road-america"),
    ("road america", "road-america"),
    ("sebring", "sebring"),
    ("sonoma", "sonoma"),
    ("virginia-international-raceway", "virginia-international-raceway"),
    ("vir", "virginia-international-raceway"),
    ("virginia international raceway", "virginia-international-raceway"),
    ("cota", "COTA"),
    ("circuit of the americas", "COTA"),
];

/// Normalize a track name or abbreviation to its data folder name.
///
/// Unknown names are slugged (lowercased, non-alphanumerics collapsed to
/// dashes) so new tracks keep working without a mapping entry, matching
/// the folder convention of the known set.
pub fn normalize_to_folder_name(track_name: &str) -> String {
    let lowered = track_name.trim().to_lowercase();

    if let Some((_, folder)) = TRACK_FOLDERS.iter().find(|(key, _)| *key == lowered) {
        return (*folder).to_string();
    }
    // Partial match covers display-name variants like "Sebring International"
    if let Some((_, folder)) = TRACK_FOLDERS
        .iter()
        .find(|(key, _)| lowered.contains(key) || key.contains(lowered.as_str()))
    {
        return (*folder).to_string();
    }

    slug(&lowered)
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}
