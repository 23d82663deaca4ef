use tokio::io::{AsyncWrite, AsyncWriteExt};

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Writes `HTTP/1.1 <code> <reason>\r\n` followed by `Content-Type`,
/// `Content-Length`, a blank line, and `body` (§4.3). Every response carries
/// `Content-Type: application/json` and a `Content-Length` matching `body`
/// exactly (§6).
pub async fn write_response<W>(stream: &mut W, status: u16, body: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\n\r\n",
        status = status,
        reason = reason_phrase(status),
        len = body.len(),
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await
}
