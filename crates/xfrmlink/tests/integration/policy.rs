//! XFRM policy integration tests.

use xfrmlink::ipsec::{
    Family, Mark, PolicyDirection, PolicyTemplate, SecurityPolicy, Selector,
};
use xfrmlink::{ErrorKind, Result};

use crate::common::TestNamespace;

const FAMILIES: [Family; 2] = [Family::Inet, Family::Inet6];

#[tokio::test]
async fn test_policies_differ_by_mark() -> Result<()> {
    require_root!();

    for family in FAMILIES {
        let ns = TestNamespace::new("polmark")?;
        let conn = ns.connection()?;

        let sel = Selector::any(family);
        let mark1 = Mark::new(0x1234, 0xffff);
        let mark2 = Mark::new(0x5678, 0xffff);
        let policy = |mark| {
            SecurityPolicy::new(PolicyDirection::Out, sel)
                .template(PolicyTemplate::new(family, 0xdead, 0, None))
                .mark(mark)
        };

        conn.add_policy(&policy(mark1)).await?;
        conn.add_policy(&policy(mark2)).await?;
        assert_eq!(conn.dump_policy_all().await?.len(), 2);

        let err = conn.add_policy(&policy(mark1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        conn.delete_policy(&sel, PolicyDirection::Out, Some(mark1))
            .await?;
        conn.delete_policy(&sel, PolicyDirection::Out, Some(mark2))
            .await?;
        assert!(conn.dump_policy_all().await?.is_empty());
    }

    Ok(())
}

#[tokio::test]
async fn test_update_policy() -> Result<()> {
    require_root!();

    for family in FAMILIES {
        let ns = TestNamespace::new("polupd")?;
        let conn = ns.connection()?;

        let tmpl1 = PolicyTemplate::new(family, 0xdead, 0, None);
        let tmpl2 = PolicyTemplate::new(family, 0xbeef, 0, None);
        let sel = Selector::any(family);
        let mark = Mark::exact(0xf00);
        let policy = |tmpl| {
            SecurityPolicy::new(PolicyDirection::Out, sel)
                .template(tmpl)
                .mark(mark)
        };

        // Update creates a missing policy.
        conn.update_policy(&policy(tmpl1)).await?;
        let dump = conn.dump_policy_all().await?;
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].1.templates()[0].spi, 0xdead);

        // Add never updates.
        let err = conn.add_policy(&policy(tmpl2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        conn.update_policy(&policy(tmpl2)).await?;
        let dump = conn.dump_policy_all().await?;
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].1.templates()[0].spi, 0xbeef);
        assert_eq!(dump[0].0.mark, Some(mark));
    }

    Ok(())
}

#[tokio::test]
async fn test_policies_differ_by_direction() -> Result<()> {
    require_root!();

    for family in FAMILIES {
        let ns = TestNamespace::new("poldir")?;
        let conn = ns.connection()?;

        let sel = Selector::any(family);
        let mark = Mark::exact(0xf00);
        for dir in [PolicyDirection::Out, PolicyDirection::In] {
            let policy = SecurityPolicy::new(dir, sel)
                .template(PolicyTemplate::new(family, 0xdead, 0, None))
                .mark(mark);
            conn.add_policy(&policy).await?;
        }
        assert_eq!(conn.dump_policy_all().await?.len(), 2);

        conn.flush_policy().await?;
        assert!(conn.dump_policy_all().await?.is_empty());
    }

    Ok(())
}

#[tokio::test]
async fn test_delete_missing_policy() -> Result<()> {
    require_root!();

    let ns = TestNamespace::new("poldel")?;
    let conn = ns.connection()?;

    let err = conn
        .delete_policy(&Selector::any(Family::Inet), PolicyDirection::Forward, None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    Ok(())
}
