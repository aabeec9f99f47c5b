//! DNS核心类型定义

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// DNS查询请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// 事务ID
    pub id: u16,
    /// 标志位
    pub flags: Flags,
    /// 查询问题
    pub query: Query,
}

/// DNS响应
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// 事务ID
    pub id: u16,
    /// 标志位
    pub flags: Flags,
    /// 查询问题
    pub queries: Vec<Query>,
    /// 回答记录
    pub answers: Vec<Record>,
    /// 权威记录
    pub authorities: Vec<Record>,
    /// 附加记录
    pub additionals: Vec<Record>,
}

/// DNS查询问题
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    /// 查询名称
    pub name: String,
    /// 查询类型
    pub qtype: RecordType,
    /// 查询类别
    pub qclass: QClass,
}

impl Query {
    /// 创建IN类别的查询
    pub fn new(name: impl Into<String>, qtype: RecordType) -> Self {
        Self {
            name: name.into(),
            qtype,
            qclass: QClass::IN,
        }
    }
}

/// DNS资源记录
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 记录名称
    pub name: String,
    /// 记录类型
    pub rtype: RecordType,
    /// 记录类别
    pub class: QClass,
    /// 生存时间(秒)
    pub ttl: u32,
    /// 记录数据
    pub data: RecordData,
}

/// DNS记录数据
#[derive(Debug, Clone, PartialEq)]
pub enum RecordData {
    /// A记录 - IPv4地址
    A(Ipv4Addr),
    /// AAAA记录 - IPv6地址
    AAAA(Ipv6Addr),
    /// CNAME记录 - 别名
    CNAME(String),
    /// MX记录 - 邮件交换
    MX {
        /// 优先级，数值越小优先级越高
        priority: u16,
        /// 邮件服务器域名
        exchange: String,
    },
    /// NS记录 - 名称服务器
    NS(String),
    /// PTR记录 - 指针
    PTR(String),
    /// SOA记录 - 授权开始
    SOA {
        /// 主名称服务器
        mname: String,
        /// 管理员邮箱
        rname: String,
        /// 序列号
        serial: u32,
        /// 刷新间隔（秒）
        refresh: u32,
        /// 重试间隔（秒）
        retry: u32,
        /// 过期时间（秒）
        expire: u32,
        /// 最小TTL（秒）
        minimum: u32,
    },
    /// TXT记录 - 文本
    TXT(Vec<String>),
    /// 未知记录类型
    Unknown(Vec<u8>),
}

/// DNS记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    /// A记录
    A,
    /// NS记录
    NS,
    /// CNAME记录
    CNAME,
    /// SOA记录
    SOA,
    /// PTR记录
    PTR,
    /// MX记录
    MX,
    /// TXT记录
    TXT,
    /// AAAA记录
    AAAA,
    /// 未知类型
    Unknown(u16),
}

/// DNS查询类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QClass {
    /// Internet类别
    IN,
    /// Chaos类别
    CH,
    /// Hesiod类别
    HS,
    /// 任意类别
    ANY,
    /// 未知类别
    Unknown(u16),
}

/// DNS标志位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    /// 查询/响应标志
    pub qr: bool,
    /// 操作码
    pub opcode: u8,
    /// 权威回答
    pub aa: bool,
    /// 截断标志
    pub tc: bool,
    /// 期望递归
    pub rd: bool,
    /// 递归可用
    pub ra: bool,
    /// 保留位
    pub z: u8,
    /// 响应码
    pub rcode: u8,
}

/// DNS响应码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// 无错误
    NoError,
    /// 格式错误
    FormatError,
    /// 服务器失败
    ServerFailure,
    /// 域名不存在
    NxDomain,
    /// 未实现
    NotImplemented,
    /// 查询被拒绝
    Refused,
    /// 未知响应码
    Unknown(u8),
}

/// MX查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxRecord {
    /// 邮件服务器域名
    pub host: String,
    /// 优先级
    pub preference: u16,
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            _ => RecordType::Unknown(value),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(rtype: RecordType) -> Self {
        match rtype {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::Unknown(value) => value,
        }
    }
}

impl From<u16> for QClass {
    fn from(value: u16) -> Self {
        match value {
            1 => QClass::IN,
            3 => QClass::CH,
            4 => QClass::HS,
            255 => QClass::ANY,
            _ => QClass::Unknown(value),
        }
    }
}

impl From<QClass> for u16 {
    fn from(qclass: QClass) -> Self {
        match qclass {
            QClass::IN => 1,
            QClass::CH => 3,
            QClass::HS => 4,
            QClass::ANY => 255,
            QClass::Unknown(value) => value,
        }
    }
}

impl From<u8> for ResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormatError,
            2 => ResponseCode::ServerFailure,
            3 => ResponseCode::NxDomain,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            _ => ResponseCode::Unknown(value),
        }
    }
}

impl From<ResponseCode> for u8 {
    fn from(rcode: ResponseCode) -> Self {
        match rcode {
            ResponseCode::NoError => 0,
            ResponseCode::FormatError => 1,
            ResponseCode::ServerFailure => 2,
            ResponseCode::NxDomain => 3,
            ResponseCode::NotImplemented => 4,
            ResponseCode::Refused => 5,
            ResponseCode::Unknown(value) => value,
        }
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            qr: false,
            opcode: 0,
            aa: false,
            tc: false,
            rd: true,
            ra: false,
            z: 0,
            rcode: 0,
        }
    }
}

impl Flags {
    /// 打包为头部中的16位标志字段
    pub fn to_u16(&self) -> u16 {
        let mut flags = 0u16;
        if self.qr { flags |= 0x8000; }
        flags |= ((self.opcode & 0x0F) as u16) << 11;
        if self.aa { flags |= 0x0400; }
        if self.tc { flags |= 0x0200; }
        if self.rd { flags |= 0x0100; }
        if self.ra { flags |= 0x0080; }
        flags |= ((self.z & 0x07) as u16) << 4;
        flags |= (self.rcode & 0x0F) as u16;
        flags
    }

    /// 从头部中的16位标志字段解析
    pub fn from_u16(raw: u16) -> Self {
        Self {
            qr: (raw & 0x8000) != 0,
            opcode: ((raw >> 11) & 0x0F) as u8,
            aa: (raw & 0x0400) != 0,
            tc: (raw & 0x0200) != 0,
            rd: (raw & 0x0100) != 0,
            ra: (raw & 0x0080) != 0,
            z: ((raw >> 4) & 0x07) as u8,
            rcode: (raw & 0x0F) as u8,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::Unknown(value) => write!(f, "TYPE{}", value),
        }
    }
}
