//! 通用工具函数

use uuid::Uuid;

/// 校验用户名格式
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= 150
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

/// 轻量邮箱格式校验，不做完整RFC解析
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.splitn(2, '@');
    match (parts.next(), parts.next()) {
        (Some(local), Some(domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        _ => false,
    }
}

/// 生成带uuid前缀的存储文件名，避免上传同名文件互相覆盖
pub fn generate_storage_name(original: &str) -> String {
    let sanitized: String = original
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("{}_{}", Uuid::new_v4().simple(), sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_username() {
        assert!(is_valid_username("dr.house"));
        assert!(is_valid_username("a_b-c+d@e"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("white space"));
        assert!(!is_valid_username(&"x".repeat(151)));
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@clinic.example.org"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("a@nodot"));
        assert!(!is_valid_email("a b@x.com"));
    }

    #[test]
    fn test_generate_storage_name() {
        let name = generate_storage_name("retina scan (left).png");
        assert!(name.ends_with("retina_scan__left_.png"));
        assert_ne!(name, generate_storage_name("retina scan (left).png"));
    }
}
