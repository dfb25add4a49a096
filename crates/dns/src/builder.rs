use super::message::{DnsFlags, DnsMessage, DnsOpcode, DnsQuestion, DnsRecord, DnsResponseCode};

/// Assembles messages section by section. `new` starts from a recursive query.
#[derive(Debug, Clone)]
pub struct DnsMessageBuilder {
    id: u16,
    flags: DnsFlags,
    questions: Vec<DnsQuestion>,
    answers: Vec<DnsRecord>,
    authority_records: Vec<DnsRecord>,
    additional_records: Vec<DnsRecord>,
    response_code: Option<DnsResponseCode>,
}

impl Default for DnsMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsMessageBuilder {
    pub fn new() -> Self {
        Self {
            id: 0,
            flags: DnsFlags::new(false, DnsOpcode::Query, false, false, true, false, false, false),
            questions: Vec::new(),
            answers: Vec::new(),
            authority_records: Vec::new(),
            additional_records: Vec::new(),
            response_code: None,
        }
    }

    /// Start a reply to `query`: same ID, opcode, RD bit and questions.
    pub fn reply_to(query: &DnsMessage) -> Self {
        let mut builder = Self::new().with_id(query.id);
        builder.flags.opcode = query.flags.opcode;
        builder.flags.recursion_desired = query.flags.recursion_desired;
        builder.questions = query.questions().to_vec();
        builder
    }

    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    pub fn with_flags(mut self, flags: DnsFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Mark the answer as coming from an authority for the name.
    pub fn authoritative(mut self) -> Self {
        self.flags.authorative_answer = true;
        self
    }

    pub fn add_question(mut self, question: DnsQuestion) -> Self {
        self.questions.push(question);
        self
    }

    pub fn add_answer(mut self, answer: DnsRecord) -> Self {
        self.answers.push(answer);
        self
    }

    pub fn add_authority_record(mut self, record: DnsRecord) -> Self {
        self.authority_records.push(record);
        self
    }

    pub fn add_additional_record(mut self, record: DnsRecord) -> Self {
        self.additional_records.push(record);
        self
    }

    /// Sets QR and the response code.
    pub fn with_response(mut self, response_code: DnsResponseCode) -> Self {
        self.response_code = Some(response_code);
        self
    }

    pub fn build(self) -> DnsMessage {
        let mut message = DnsMessage::new(
            self.id,
            self.flags,
            self.questions,
            self.answers,
            self.authority_records,
            self.additional_records,
        );

        if let Some(rcode) = self.response_code {
            message.flags.response = true;
            message.set_response_code(rcode);
        }

        message
    }
}
