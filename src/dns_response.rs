//! DNS响应构建与结果提取
//!
//! `DnsResponseBuilder` 用于构造响应（测试桩与自定义执行器都会用到），
//! `Response` 上的提取方法把回答部分转换为各类查询的返回值。

use crate::types::*;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// DNS响应构建器
#[derive(Debug, Clone)]
pub struct DnsResponseBuilder {
    id: u16,
    flags: Flags,
    queries: Vec<Query>,
    answers: Vec<Record>,
    authorities: Vec<Record>,
    additionals: Vec<Record>,
}

impl Default for DnsResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsResponseBuilder {
    /// 创建新的DNS响应构建器
    pub fn new() -> Self {
        Self {
            id: 0,
            flags: Flags {
                qr: true,  // 响应
                rd: true,
                ra: true,  // 递归可用
                ..Flags::default()
            },
            queries: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// 设置事务ID
    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    /// 设置响应码
    pub fn with_response_code(mut self, rcode: u8) -> Self {
        self.flags.rcode = rcode;
        self
    }

    /// 设置截断标志
    pub fn with_truncated(mut self, tc: bool) -> Self {
        self.flags.tc = tc;
        self
    }

    /// 添加查询问题
    pub fn add_query(mut self, query: Query) -> Self {
        self.queries.push(query);
        self
    }

    fn answer(mut self, name: impl Into<String>, rtype: RecordType, ttl: u32, data: RecordData) -> Self {
        self.answers.push(Record {
            name: name.into(),
            rtype,
            class: QClass::IN,
            ttl,
            data,
        });
        self
    }

    /// 添加A记录到回答部分
    pub fn add_a_answer(self, name: impl Into<String>, ttl: u32, ip: Ipv4Addr) -> Self {
        self.answer(name, RecordType::A, ttl, RecordData::A(ip))
    }

    /// 添加AAAA记录到回答部分
    pub fn add_aaaa_answer(self, name: impl Into<String>, ttl: u32, ip: Ipv6Addr) -> Self {
        self.answer(name, RecordType::AAAA, ttl, RecordData::AAAA(ip))
    }

    /// 添加CNAME记录到回答部分
    pub fn add_cname_answer(self, name: impl Into<String>, ttl: u32, target: impl Into<String>) -> Self {
        self.answer(name, RecordType::CNAME, ttl, RecordData::CNAME(target.into()))
    }

    /// 添加MX记录到回答部分
    pub fn add_mx_answer(
        self,
        name: impl Into<String>,
        ttl: u32,
        priority: u16,
        exchange: impl Into<String>,
    ) -> Self {
        let data = RecordData::MX { priority, exchange: exchange.into() };
        self.answer(name, RecordType::MX, ttl, data)
    }

    /// 添加NS记录到回答部分
    pub fn add_ns_answer(self, name: impl Into<String>, ttl: u32, nameserver: impl Into<String>) -> Self {
        self.answer(name, RecordType::NS, ttl, RecordData::NS(nameserver.into()))
    }

    /// 添加PTR记录到回答部分
    pub fn add_ptr_answer(self, name: impl Into<String>, ttl: u32, target: impl Into<String>) -> Self {
        self.answer(name, RecordType::PTR, ttl, RecordData::PTR(target.into()))
    }

    /// 添加TXT记录到回答部分
    pub fn add_txt_answer(self, name: impl Into<String>, ttl: u32, texts: Vec<String>) -> Self {
        self.answer(name, RecordType::TXT, ttl, RecordData::TXT(texts))
    }

    /// 添加权威记录
    pub fn add_authority(mut self, record: Record) -> Self {
        self.authorities.push(record);
        self
    }

    /// 构建DNS响应
    pub fn build(self) -> Response {
        Response {
            id: self.id,
            flags: self.flags,
            queries: self.queries,
            answers: self.answers,
            authorities: self.authorities,
            additionals: self.additionals,
        }
    }
}

impl Response {
    /// 响应码
    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::from(self.flags.rcode)
    }

    /// 回答部分中的全部A/AAAA地址，保持原有顺序
    pub fn ip_addrs(&self) -> Vec<IpAddr> {
        self.answers
            .iter()
            .filter_map(|record| match &record.data {
                RecordData::A(ip) => Some(IpAddr::V4(*ip)),
                RecordData::AAAA(ip) => Some(IpAddr::V6(*ip)),
                _ => None,
            })
            .collect()
    }

    /// 回答部分中的PTR目标
    pub fn ptr_names(&self) -> Vec<String> {
        self.answers
            .iter()
            .filter_map(|record| match &record.data {
                RecordData::PTR(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// 回答部分中的名称服务器
    pub fn ns_names(&self) -> Vec<String> {
        self.answers
            .iter()
            .filter_map(|record| match &record.data {
                RecordData::NS(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// 回答部分中的TXT字符串，每条记录的多个片段拼接为一个字符串
    pub fn txt_strings(&self) -> Vec<String> {
        self.answers
            .iter()
            .filter_map(|record| match &record.data {
                RecordData::TXT(parts) => Some(parts.concat()),
                _ => None,
            })
            .collect()
    }

    /// 回答部分中的MX记录，按优先级升序排列
    pub fn mx_records(&self) -> Vec<MxRecord> {
        let mut records: Vec<MxRecord> = self
            .answers
            .iter()
            .filter_map(|record| match &record.data {
                RecordData::MX { priority, exchange } => Some(MxRecord {
                    host: exchange.clone(),
                    preference: *priority,
                }),
                _ => None,
            })
            .collect();
        records.sort_by_key(|mx| mx.preference);
        records
    }

    /// 沿CNAME链找到的最终名称
    ///
    /// 没有CNAME记录时返回 `None`。
    pub fn cname_target(&self) -> Option<String> {
        let mut current: Option<&str> = None;

        // 链长不会超过记录数，避免环路
        for _ in 0..self.answers.len() {
            let next = self.answers.iter().find_map(|record| match &record.data {
                RecordData::CNAME(target)
                    if current.map_or(true, |c| record.name.eq_ignore_ascii_case(c)) =>
                {
                    Some(target.as_str())
                }
                _ => None,
            });

            match next {
                Some(target) if Some(target) != current => current = Some(target),
                _ => break,
            }
        }

        current.map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_response() {
        let response = DnsResponseBuilder::new()
            .with_id(12345)
            .add_query(Query::new("example.com", RecordType::A))
            .add_a_answer("example.com", 300, Ipv4Addr::new(192, 168, 1, 1))
            .build();

        assert_eq!(response.id, 12345);
        assert!(response.flags.qr);
        assert_eq!(response.response_code(), ResponseCode::NoError);
        assert_eq!(response.queries[0].name, "example.com");
        assert_eq!(response.ip_addrs(), vec![IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))]);
    }

    #[test]
    fn test_ip_addrs_skip_other_records() {
        let response = DnsResponseBuilder::new()
            .add_cname_answer("www.example.com", 60, "example.com")
            .add_a_answer("example.com", 60, Ipv4Addr::new(1, 2, 3, 4))
            .add_aaaa_answer("example.com", 60, "2606:2800::1".parse().unwrap())
            .build();

        let addrs = response.ip_addrs();
        assert_eq!(addrs.len(), 2);
        assert!(addrs[0].is_ipv4());
        assert!(addrs[1].is_ipv6());
    }

    #[test]
    fn test_mx_records_sorted_by_preference() {
        let response = DnsResponseBuilder::new()
            .add_mx_answer("example.com", 300, 20, "mx2.example.com")
            .add_mx_answer("example.com", 300, 5, "mx0.example.com")
            .add_mx_answer("example.com", 300, 10, "mx1.example.com")
            .build();

        let hosts: Vec<_> = response.mx_records().into_iter().map(|mx| mx.host).collect();
        assert_eq!(hosts, vec!["mx0.example.com", "mx1.example.com", "mx2.example.com"]);
    }

    #[test]
    fn test_txt_fragments_are_joined() {
        let response = DnsResponseBuilder::new()
            .add_txt_answer("example.com", 300, vec!["v=spf1 ".into(), "-all".into()])
            .build();
        assert_eq!(response.txt_strings(), vec!["v=spf1 -all".to_string()]);
    }

    #[test]
    fn test_cname_chain_is_followed() {
        let response = DnsResponseBuilder::new()
            .add_cname_answer("www.example.com", 60, "edge.example.net")
            .add_cname_answer("edge.example.net", 60, "cdn.example.org")
            .add_a_answer("cdn.example.org", 60, Ipv4Addr::new(1, 1, 1, 1))
            .build();
        assert_eq!(response.cname_target().as_deref(), Some("cdn.example.org"));

        let plain = DnsResponseBuilder::new()
            .add_a_answer("example.com", 60, Ipv4Addr::new(1, 1, 1, 1))
            .build();
        assert_eq!(plain.cname_target(), None);
    }

    #[test]
    fn test_cname_loop_terminates() {
        let response = DnsResponseBuilder::new()
            .add_cname_answer("a.example", 60, "b.example")
            .add_cname_answer("b.example", 60, "a.example")
            .build();
        assert!(response.cname_target().is_some());
    }
}
