use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};

use bridge6_transport::UnixSocketListener;
use bridge6_wire::envelope::{self, TunnelFrame};
use bridge6_wire::BitCursor;

use crate::cmd::{parse_duration, InjectArgs};
use crate::exit::{
    io_error, transport_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, USAGE,
};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: InjectArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let mut wire = BytesMut::new();
    if let Some(mtu) = args.mtu {
        envelope::encode(&TunnelFrame::SetMtu(mtu), &mut wire);
    }
    for address in &args.address {
        envelope::encode(&TunnelFrame::AddAddress(*address), &mut wire);
    }
    if let Some(frame) = payload {
        envelope::encode(
            &TunnelFrame::Data {
                flags: args.flags,
                ethertype: args.ethertype,
                frame,
            },
            &mut wire,
        );
    }
    if wire.is_empty() {
        return Err(CliError::new(
            USAGE,
            "nothing to send: pass --hex, --file, --address, or --mtu",
        ));
    }

    let mut stream = UnixSocketListener::connect(&args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    stream
        .write_all(&wire)
        .map_err(|err| io_error("send failed", err))?;

    if args.wait {
        stream
            .set_read_timeout(Some(wait_timeout))
            .map_err(|err| transport_error("timeout setup failed", err))?;
        let mut buf = vec![0u8; 65536];
        let read = stream
            .read(&mut buf)
            .map_err(|err| io_error("receive failed", err))?;
        if read == 0 {
            return Err(CliError::new(FAILURE, "bridge closed the connection"));
        }
        let mut cur = BitCursor::new(&buf[..read]);
        match envelope::decode(&mut cur) {
            Some(TunnelFrame::Data {
                flags,
                ethertype,
                frame,
            }) => print_reply(flags, ethertype, &frame, format),
            other => {
                return Err(CliError::new(
                    DATA_INVALID,
                    format!("unexpected reply: {other:?}"),
                ))
            }
        }
    }

    Ok(SUCCESS)
}

fn resolve_payload(args: &InjectArgs) -> CliResult<Option<Bytes>> {
    if let Some(hex) = &args.hex {
        return Ok(Some(parse_hex(hex)?.into()));
    }
    if let Some(path) = &args.file {
        let data = std::fs::read(path).map_err(|err| {
            io_error(&format!("failed reading {}", path.display()), err)
        })?;
        return Ok(Some(data.into()));
    }
    Ok(None)
}

fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex payload has an odd digit count"));
    }
    let mut out = Vec::with_capacity(cleaned.len() / 2);
    for pair in cleaned.as_bytes().chunks_exact(2) {
        let digits = std::str::from_utf8(pair)
            .map_err(|_| CliError::new(USAGE, "hex payload has non-hex characters"))?;
        let byte = u8::from_str_radix(digits, 16)
            .map_err(|_| CliError::new(USAGE, format!("invalid hex pair: {digits}")))?;
        out.push(byte);
    }
    Ok(out)
}
