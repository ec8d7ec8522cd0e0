/// The parts of an AWS ARN that this crate cares about.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Arn<'a> {
    pub(crate) service: &'a str,
    pub(crate) account_id: &'a str,
    pub(crate) resource: &'a str,
}

impl<'a> Arn<'a> {
    /// Parse `arn:partition:service:region:account-id:resource`.
    pub(crate) fn parse(value: &'a str) -> Option<Self> {
        let mut parts = value.splitn(6, ':');
        match [
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ] {
            [
                Some("arn"),
                Some(partition),
                Some(service),
                Some(_region),
                Some(account_id),
                Some(resource),
            ] if !partition.is_empty() && !service.is_empty() && !resource.is_empty() => {
                Some(Self {
                    service,
                    account_id,
                    resource,
                })
            }
            _ => None,
        }
    }

    pub(crate) fn is_arn(value: &str) -> bool {
        Arn::parse(value).is_some()
    }

    /// Whether this names an IAM role.
    pub(crate) fn is_role(&self) -> bool {
        self.service == "iam" && self.resource.starts_with("role/")
    }
}
