use runway_common::RunwayError;

/// Build a single-entry tar holding the submitted source, owned by the
/// sandbox user so the program can read it without root.
pub fn source_archive(
    file_name: &str,
    code: &str,
    uid: u64,
    gid: u64,
) -> Result<Vec<u8>, RunwayError> {
    let content = code.as_bytes();
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_uid(uid);
    header.set_gid(gid);
    header.set_mtime(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    );
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_data(&mut header, file_name, content)
        .map_err(|e| RunwayError::SandboxFailure(format!("failed to archive source: {}", e)))?;
    builder
        .into_inner()
        .map_err(|e| RunwayError::SandboxFailure(format!("failed to archive source: {}", e)))
}

/// `"1001:1001"` -> (1001, 1001). A bare uid reuses it as the gid.
pub fn parse_user(user: &str) -> Option<(u64, u64)> {
    let mut parts = user.splitn(2, ':');
    let uid = parts.next()?.trim().parse().ok()?;
    let gid = match parts.next() {
        Some(g) => g.trim().parse().ok()?,
        None => uid,
    };
    Some((uid, gid))
}
