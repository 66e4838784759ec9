//! Warm-process host: serves invocations over HTTP one at a time, so the
//! model cache survives between requests.

use anyhow::Result;
use log::{info, warn};

use crate::fault::{FaultKind, InvokeFault};
use crate::handler::{Handler, Invocation};

pub fn bind(listen: &str) -> Result<tiny_http::Server> {
    let server = tiny_http::Server::http(listen)
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", listen, e))?;
    match server.server_addr().to_ip() {
        Some(addr) => info!("listening on {}", addr),
        None => info!("listening on {}", listen),
    }
    Ok(server)
}

pub fn run_server(handler: &Handler, listen: &str) -> Result<()> {
    let server = bind(listen)?;
    serve(&server, handler);
    Ok(())
}

/// Blocks serving requests until the server is dropped or unblocked.
pub fn serve(server: &tiny_http::Server, handler: &Handler) {
    for request in server.incoming_requests() {
        match (request.method(), request.url()) {
            (tiny_http::Method::Get, "/health") => {
                let _ = request.respond(tiny_http::Response::from_string("ok"));
            }
            (tiny_http::Method::Post, "/invoke") => handle_invoke(request, handler),
            _ => {
                let response =
                    tiny_http::Response::from_string("not found").with_status_code(404);
                let _ = request.respond(response);
            }
        }
    }
}

fn handle_invoke(mut request: tiny_http::Request, handler: &Handler) {
    let mut body = Vec::new();
    let invocation = match request.as_reader().read_to_end(&mut body) {
        Ok(_) => handler.invoke(&body),
        Err(e) => handler.reject(InvokeFault::Decode(format!("reading request body: {e}"))),
    };
    let Invocation { body, fault } = invocation;

    let mut response = tiny_http::Response::from_string(body).with_status_code(status_code(fault));
    if let Ok(header) =
        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
    {
        response = response.with_header(header);
    }
    if let Err(e) = request.respond(response) {
        warn!("failed to write response: {}", e);
    }
}

/// Out-of-band signal for the fault kind; the body is always the envelope.
pub fn status_code(fault: Option<FaultKind>) -> u16 {
    match fault {
        None => 200,
        Some(FaultKind::Decode) => 400,
        Some(FaultKind::Transport) => 502,
        Some(FaultKind::Resolution) => 503,
        Some(FaultKind::Prediction) | Some(FaultKind::Unexpected) => 500,
    }
}
