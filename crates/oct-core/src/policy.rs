//! 归属策略引擎
//!
//! 对(请求主体, 访问方法, 实体归属)做纯函数判定，无副作用、无重试。
//! 归属链: Review -> AnalysisResult -> OctImage -> Doctor -> User，
//! 写操作必须沿链解析到最终归属用户后才能放行。

use crate::error::{OctError, Result};
use uuid::Uuid;

/// 访问方法分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMethod {
    List,
    Retrieve,
    Create,
    Update,
    PartialUpdate,
    Delete,
}

impl AccessMethod {
    /// 只读方法不改变实体状态
    pub fn is_read_only(&self) -> bool {
        matches!(self, AccessMethod::List | AccessMethod::Retrieve)
    }
}

/// 受控实体形态的封闭集合
///
/// 每种形态有明确的归属解析路径:
/// - Image 直接挂在医生档案下
/// - Analysis 经由其影像找到医生
/// - Review 归属于评审作者本人
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Image,
    Analysis,
    Review,
}

/// 归属链解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ownership {
    /// 链上最终归属的用户
    User(Uuid),
    /// 无法识别的实体形态，解析失败
    Unknown,
}

/// 授权判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// 归属授权判定
///
/// 规则:
/// - 未认证主体一律拒绝
/// - 只读方法对已认证主体放行（列表可见范围由记录服务另行收窄）
/// - 写方法要求归属链最终用户与主体一致，未知形态拒绝
pub fn authorize(principal: Option<Uuid>, method: AccessMethod, ownership: &Ownership) -> Decision {
    let Some(user_id) = principal else {
        return Decision::Deny;
    };

    if method.is_read_only() {
        return Decision::Allow;
    }

    match ownership {
        Ownership::User(owner) if *owner == user_id => Decision::Allow,
        _ => Decision::Deny,
    }
}

/// 判定失败时转换为权限错误，便于调用方直接`?`传播
pub fn enforce(principal: Option<Uuid>, method: AccessMethod, ownership: &Ownership) -> Result<()> {
    match authorize(principal, method, ownership) {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(OctError::Forbidden(
            "You do not have permission to perform this action".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthenticated_denied() {
        let ownership = Ownership::User(Uuid::new_v4());

        assert_eq!(authorize(None, AccessMethod::List, &ownership), Decision::Deny);
        assert_eq!(authorize(None, AccessMethod::Create, &ownership), Decision::Deny);
        assert_eq!(authorize(None, AccessMethod::Delete, &Ownership::Unknown), Decision::Deny);
    }

    #[test]
    fn test_reads_allowed_for_authenticated() {
        let principal = Uuid::new_v4();
        let other = Uuid::new_v4();

        // 只读方法不要求归属一致
        assert_eq!(
            authorize(Some(principal), AccessMethod::List, &Ownership::User(other)),
            Decision::Allow
        );
        assert_eq!(
            authorize(Some(principal), AccessMethod::Retrieve, &Ownership::User(other)),
            Decision::Allow
        );
    }

    #[test]
    fn test_mutation_requires_ownership() {
        let principal = Uuid::new_v4();
        let other = Uuid::new_v4();

        for method in [
            AccessMethod::Create,
            AccessMethod::Update,
            AccessMethod::PartialUpdate,
            AccessMethod::Delete,
        ] {
            assert_eq!(
                authorize(Some(principal), method, &Ownership::User(principal)),
                Decision::Allow
            );
            assert_eq!(
                authorize(Some(principal), method, &Ownership::User(other)),
                Decision::Deny
            );
        }
    }

    #[test]
    fn test_unknown_shape_fails_closed() {
        let principal = Uuid::new_v4();

        assert_eq!(
            authorize(Some(principal), AccessMethod::Update, &Ownership::Unknown),
            Decision::Deny
        );
        // 只读仍然放行，收窄由记录服务负责
        assert_eq!(
            authorize(Some(principal), AccessMethod::Retrieve, &Ownership::Unknown),
            Decision::Allow
        );
    }

    #[test]
    fn test_enforce_surfaces_forbidden() {
        let principal = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(enforce(Some(principal), AccessMethod::Update, &Ownership::User(principal)).is_ok());

        let err = enforce(Some(principal), AccessMethod::Update, &Ownership::User(other));
        assert!(matches!(err, Err(OctError::Forbidden(_))));
    }
}
