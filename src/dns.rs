use std::net::Ipv4Addr;

use anyhow::{anyhow, Result};
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query};
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};

use crate::transport::Answer;

/// Receive buffer size; also advertised as the EDNS UDP payload size.
pub const MAX_REPLY_SIZE: usize = 4096;

/// Build a DNS A query for the given fully qualified domain.
///
/// Sets RD=1 and opcode QUERY. When a client-subnet address is configured,
/// an EDNS0 OPT record carrying the ECS option is appended.
///
/// Returns the serialized query bytes ready to send over UDP.
pub fn build_query(id: u16, fqdn: &str, client_subnet: Option<Ipv4Addr>) -> Result<Vec<u8>> {
	let name = Name::from_ascii(fqdn)
		.map_err(|e| anyhow!("invalid domain name '{}': {}", fqdn, e))?;

	let mut message = Message::new();
	message.set_id(id);
	message.set_message_type(MessageType::Query);
	message.set_op_code(OpCode::Query);
	message.set_recursion_desired(true);

	let mut query = Query::query(name, RecordType::A);
	query.set_query_class(DNSClass::IN);
	message.add_query(query);

	if let Some(addr) = client_subnet {
		let mut edns = Edns::new();
		edns.set_max_payload(MAX_REPLY_SIZE as u16);
		edns.options_mut().insert(EdnsOption::Unknown(
			u16::from(EdnsCode::Subnet),
			client_subnet_option(addr),
		));
		*message.extensions_mut() = Some(edns);
	}

	message.to_vec()
		.map_err(|e| anyhow!("failed to serialize DNS query: {}", e))
}

/// Wire body of an ECS option: family 1 (IPv4), source prefix 0, scope
/// prefix 0, followed by the full address.
pub fn client_subnet_option(addr: Ipv4Addr) -> Vec<u8> {
	let mut body = vec![0x00, 0x01, 0x00, 0x00];
	body.extend_from_slice(&addr.octets());
	body
}

/// Extract the transaction id, question name, and A addresses from a reply.
///
/// Returns an error when the datagram cannot be parsed or carries no
/// question; such replies are dropped by the caller.
pub fn parse_reply(bytes: &[u8]) -> Result<Answer> {
	let message = Message::from_vec(bytes)
		.map_err(|e| anyhow!("failed to parse DNS reply: {}", e))?;

	let question = message.queries().first()
		.ok_or_else(|| anyhow!("reply carries no question"))?;
	let domain = question.name().to_string();

	let mut addresses = Vec::new();
	for record in message.answers() {
		if let Some(RData::A(a)) = record.data() {
			addresses.push(a.0);
		}
	}

	Ok(Answer { id: message.id(), domain, addresses })
}
