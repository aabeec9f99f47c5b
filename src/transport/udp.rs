//! UDP查询执行器

use super::QueryExecutor;
use crate::types::{Flags, Query, QClass, Record, RecordData, RecordType, ResponseCode};
use crate::{dns_debug, DnsError, Request, Response, Result};
use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// 不带EDNS时UDP响应的最大长度
const MAX_UDP_PAYLOAD: usize = 512;

/// 域名解析时允许的最大跳转次数，防止压缩指针循环
const MAX_NAME_JUMPS: usize = 100;

/// UDP查询执行器
#[derive(Debug, Default, Clone)]
pub struct UdpExecutor;

impl UdpExecutor {
    /// 创建新的UDP执行器
    pub fn new() -> Self {
        Self
    }

    /// 序列化DNS请求为字节
    pub fn serialize_request(request: &Request) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(MAX_UDP_PAYLOAD);

        // DNS头部 (12字节)
        buffer.extend_from_slice(&request.id.to_be_bytes());
        buffer.extend_from_slice(&request.flags.to_u16().to_be_bytes());
        // 问题计数
        buffer.extend_from_slice(&1u16.to_be_bytes());
        // 回答、权威、附加计数
        buffer.extend_from_slice(&[0u8; 6]);

        Self::encode_name(&request.query.name, &mut buffer)?;
        buffer.extend_from_slice(&u16::from(request.query.qtype).to_be_bytes());
        buffer.extend_from_slice(&u16::from(request.query.qclass).to_be_bytes());

        Ok(buffer)
    }

    /// 编码域名
    pub fn encode_name(name: &str, buffer: &mut Vec<u8>) -> Result<()> {
        let name = name.trim_end_matches('.');
        if name.is_empty() {
            buffer.push(0);
            return Ok(());
        }

        for label in name.split('.') {
            if label.is_empty() {
                return Err(DnsError::Protocol(format!("Empty label in name: {}", name)));
            }
            if label.len() > 63 {
                return Err(DnsError::Protocol("Label too long".to_string()));
            }
            buffer.push(label.len() as u8);
            buffer.extend_from_slice(label.as_bytes());
        }

        buffer.push(0);
        Ok(())
    }

    /// 反序列化DNS响应
    pub fn deserialize_response(data: &[u8]) -> Result<Response> {
        if data.len() < 12 {
            return Err(DnsError::Protocol("Response too short".to_string()));
        }

        let id = u16::from_be_bytes([data[0], data[1]]);
        let flags = Flags::from_u16(u16::from_be_bytes([data[2], data[3]]));

        let qdcount = u16::from_be_bytes([data[4], data[5]]);
        let ancount = u16::from_be_bytes([data[6], data[7]]);
        let nscount = u16::from_be_bytes([data[8], data[9]]);
        let arcount = u16::from_be_bytes([data[10], data[11]]);

        let mut offset = 12;
        let mut queries = Vec::with_capacity(qdcount as usize);
        for _ in 0..qdcount {
            let (query, new_offset) = Self::parse_query(data, offset)?;
            queries.push(query);
            offset = new_offset;
        }

        let mut sections: [Vec<Record>; 3] = Default::default();
        for (section, count) in sections.iter_mut().zip([ancount, nscount, arcount]) {
            for _ in 0..count {
                let (record, new_offset) = Self::parse_record(data, offset)?;
                section.push(record);
                offset = new_offset;
            }
        }
        let [answers, authorities, additionals] = sections;

        Ok(Response {
            id,
            flags,
            queries,
            answers,
            authorities,
            additionals,
        })
    }

    /// 解析查询记录
    pub fn parse_query(data: &[u8], offset: usize) -> Result<(Query, usize)> {
        let (name, offset) = Self::parse_name(data, offset)?;

        if offset + 4 > data.len() {
            return Err(DnsError::Protocol("Invalid query format".to_string()));
        }

        let qtype = u16::from_be_bytes([data[offset], data[offset + 1]]).into();
        let qclass = u16::from_be_bytes([data[offset + 2], data[offset + 3]]).into();

        Ok((Query { name, qtype, qclass }, offset + 4))
    }

    /// 解析资源记录
    pub fn parse_record(data: &[u8], offset: usize) -> Result<(Record, usize)> {
        let (name, mut offset) = Self::parse_name(data, offset)?;

        if offset + 10 > data.len() {
            return Err(DnsError::Protocol("Invalid record format".to_string()));
        }

        let rtype: RecordType = u16::from_be_bytes([data[offset], data[offset + 1]]).into();
        let class: QClass = u16::from_be_bytes([data[offset + 2], data[offset + 3]]).into();
        let ttl = u32::from_be_bytes([data[offset + 4], data[offset + 5], data[offset + 6], data[offset + 7]]);
        let rdlength = u16::from_be_bytes([data[offset + 8], data[offset + 9]]) as usize;
        offset += 10;

        if offset + rdlength > data.len() {
            return Err(DnsError::Protocol("Invalid record data length".to_string()));
        }

        let rdata = &data[offset..offset + rdlength];
        let record_data = Self::parse_record_data(rtype, rdata, data, offset)?;
        offset += rdlength;

        Ok((Record { name, rtype, class, ttl, data: record_data }, offset))
    }

    /// 解析域名（支持压缩指针）
    pub fn parse_name(data: &[u8], mut offset: usize) -> Result<(String, usize)> {
        let mut name = String::new();
        let mut jump_return = None;
        let mut jumps = 0;

        loop {
            let len = *data
                .get(offset)
                .ok_or_else(|| DnsError::Protocol("Name parsing overflow".to_string()))?;

            if len == 0 {
                offset += 1;
                break;
            }

            if (len & 0xC0) == 0xC0 {
                let low = *data
                    .get(offset + 1)
                    .ok_or_else(|| DnsError::Protocol("Incomplete compression pointer".to_string()))?;
                let pointer = (((len & 0x3F) as usize) << 8) | low as usize;

                jumps += 1;
                if jumps > MAX_NAME_JUMPS || pointer >= data.len() {
                    return Err(DnsError::Protocol("Invalid compression pointer".to_string()));
                }

                if jump_return.is_none() {
                    jump_return = Some(offset + 2);
                }
                offset = pointer;
                continue;
            }

            if len > 63 {
                return Err(DnsError::Protocol("Label too long".to_string()));
            }

            offset += 1;
            let end = offset + len as usize;
            if end > data.len() {
                return Err(DnsError::Protocol("Name label overflow".to_string()));
            }

            if !name.is_empty() {
                name.push('.');
            }
            name.push_str(&String::from_utf8_lossy(&data[offset..end]));
            offset = end;
        }

        Ok((name, jump_return.unwrap_or(offset)))
    }

    /// 解析记录数据
    pub fn parse_record_data(
        rtype: RecordType,
        rdata: &[u8],
        full_data: &[u8],
        rdata_offset: usize,
    ) -> Result<RecordData> {
        match rtype {
            RecordType::A => {
                let octets: [u8; 4] = rdata
                    .try_into()
                    .map_err(|_| DnsError::Protocol("Invalid A record length".to_string()))?;
                Ok(RecordData::A(Ipv4Addr::from(octets)))
            }
            RecordType::AAAA => {
                let octets: [u8; 16] = rdata
                    .try_into()
                    .map_err(|_| DnsError::Protocol("Invalid AAAA record length".to_string()))?;
                Ok(RecordData::AAAA(Ipv6Addr::from(octets)))
            }
            RecordType::CNAME => Ok(RecordData::CNAME(Self::parse_name(full_data, rdata_offset)?.0)),
            RecordType::NS => Ok(RecordData::NS(Self::parse_name(full_data, rdata_offset)?.0)),
            RecordType::PTR => Ok(RecordData::PTR(Self::parse_name(full_data, rdata_offset)?.0)),
            RecordType::MX => {
                if rdata.len() < 3 {
                    return Err(DnsError::Protocol("Invalid MX record length".to_string()));
                }
                let priority = u16::from_be_bytes([rdata[0], rdata[1]]);
                let (exchange, _) = Self::parse_name(full_data, rdata_offset + 2)?;
                Ok(RecordData::MX { priority, exchange })
            }
            RecordType::TXT => {
                let mut texts = Vec::new();
                let mut offset = 0;
                while offset < rdata.len() {
                    let len = rdata[offset] as usize;
                    offset += 1;
                    if offset + len > rdata.len() {
                        return Err(DnsError::Protocol("Invalid TXT record format".to_string()));
                    }
                    texts.push(String::from_utf8_lossy(&rdata[offset..offset + len]).into_owned());
                    offset += len;
                }
                Ok(RecordData::TXT(texts))
            }
            RecordType::SOA => {
                let (mname, next) = Self::parse_name(full_data, rdata_offset)?;
                let (rname, next) = Self::parse_name(full_data, next)?;
                let fixed = full_data
                    .get(next..next + 20)
                    .ok_or_else(|| DnsError::Protocol("Invalid SOA record length".to_string()))?;
                let field = |i: usize| u32::from_be_bytes([fixed[i], fixed[i + 1], fixed[i + 2], fixed[i + 3]]);
                Ok(RecordData::SOA {
                    mname,
                    rname,
                    serial: field(0),
                    refresh: field(4),
                    retry: field(8),
                    expire: field(12),
                    minimum: field(16),
                })
            }
            RecordType::Unknown(_) => Ok(RecordData::Unknown(rdata.to_vec())),
        }
    }

    /// 按响应码把响应归类为成功或错误
    pub fn classify_response(request: &Request, response: Response) -> Result<Response> {
        if !response.flags.qr {
            return Err(DnsError::Protocol("Packet is not a response".to_string()));
        }
        if response.flags.tc {
            return Err(DnsError::Protocol("Truncated response".to_string()));
        }

        match ResponseCode::from(response.flags.rcode) {
            ResponseCode::NoError => {}
            ResponseCode::NxDomain => return Err(DnsError::NxDomain),
            ResponseCode::ServerFailure => return Err(DnsError::ServerFailure),
            ResponseCode::Refused => return Err(DnsError::Refused),
            ResponseCode::FormatError => return Err(DnsError::FormatError),
            other => {
                return Err(DnsError::Server(format!(
                    "Unexpected response code {} for {}",
                    u8::from(other),
                    request.query.name
                )))
            }
        }

        Ok(response)
    }

    async fn exchange_inner(&self, server: SocketAddr, request: &Request) -> Result<Response> {
        let bind_addr = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| DnsError::Network(format!("Failed to bind UDP socket: {}", e)))?;

        let request_data = Self::serialize_request(request)?;
        socket
            .send_to(&request_data, server)
            .await
            .map_err(|e| DnsError::Network(format!("UDP send failed: {} (server: {})", e, server)))?;

        let mut buffer = [0u8; MAX_UDP_PAYLOAD];
        loop {
            let (len, from) = socket
                .recv_from(&mut buffer)
                .await
                .map_err(|e| DnsError::Network(format!("UDP recv failed: {}", e)))?;

            if from != server {
                dns_debug!("丢弃来自非目标地址 {} 的数据包", from);
                continue;
            }

            let response = Self::deserialize_response(&buffer[..len])?;
            if response.id != request.id {
                dns_debug!("丢弃事务ID不匹配的响应: {} != {}", response.id, request.id);
                continue;
            }

            return Self::classify_response(request, response);
        }
    }
}

#[async_trait]
impl QueryExecutor for UdpExecutor {
    async fn exchange(&self, server: SocketAddr, query: &Query, deadline: Duration) -> Result<Response> {
        let request = Request {
            id: rand::random(),
            flags: Flags::default(),
            query: query.clone(),
        };

        dns_debug!("UDP查询 {} {} -> {}", query.qtype, query.name, server);

        match timeout(deadline, self.exchange_inner(server, &request)).await {
            Ok(result) => result,
            Err(_) => Err(DnsError::Timeout),
        }
    }

    fn transport_type(&self) -> &'static str {
        "UDP"
    }
}
