//! Partitioner - scope をプロセスへ決定的に割り当てる
//!
//! `md5(scope) mod processes == process` の scope だけを担当する。
//! 協調プロセス間で通信しない。全プロセスが同じ `processes` を共有していれば、
//! 各 scope はちょうど 1 プロセスに割り当たる。
//!
//! `process` / `processes` の妥当性は設定読み込み時に検証済みの前提。
//! ここでは補正しない。

use crate::domain::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    process: u32,
    processes: u32,
}

impl Partitioner {
    /// `processes == 0` は単一プロセス（全 scope を担当）。
    pub fn new(process: u32, processes: u32) -> Self {
        Self { process, processes }
    }

    pub fn single() -> Self {
        Self::new(0, 0)
    }

    pub fn process(&self) -> u32 {
        self.process
    }

    pub fn processes(&self) -> u32 {
        self.processes
    }

    /// Index of the process responsible for `scope`.
    pub fn owner_of(&self, scope: &Scope) -> u32 {
        if self.processes <= 1 {
            return 0;
        }
        let digest = md5::compute(scope.to_string().as_bytes());
        let hash = u128::from_be_bytes(digest.0);
        (hash % u128::from(self.processes)) as u32
    }

    pub fn owns(&self, scope: &Scope) -> bool {
        self.owner_of(scope) == self.process
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountName, ContainerName};
    use rstest::rstest;

    fn scopes(n: usize) -> Vec<Scope> {
        (0..n)
            .map(|i| {
                Scope::new(
                    AccountName::new(".expiring_objects").unwrap(),
                    ContainerName::new(format!("{:010}", 1_700_000_000 + i * 86_400)).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn single_process_owns_everything() {
        let p = Partitioner::single();
        assert!(scopes(50).iter().all(|s| p.owns(s)));

        let p = Partitioner::new(0, 1);
        assert!(scopes(50).iter().all(|s| p.owns(s)));
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(7)]
    #[case(16)]
    fn every_scope_has_exactly_one_owner(#[case] processes: u32) {
        let all = scopes(200);
        for scope in &all {
            let owners = (0..processes)
                .filter(|&i| Partitioner::new(i, processes).owns(scope))
                .count();
            assert_eq!(owners, 1, "scope {scope} owned by {owners} processes");
        }
    }

    #[test]
    fn assignment_is_deterministic() {
        let a = Partitioner::new(1, 4);
        let b = Partitioner::new(1, 4);
        for scope in scopes(30) {
            assert_eq!(a.owner_of(&scope), b.owner_of(&scope));
        }
    }

    #[test]
    fn load_is_spread_across_processes() {
        let all = scopes(400);
        for i in 0..4 {
            let p = Partitioner::new(i, 4);
            let owned = all.iter().filter(|s| p.owns(s)).count();
            assert!(owned > 0, "process {i} owns nothing");
        }
    }

    #[test]
    fn out_of_range_process_is_not_corrected() {
        // 設定ミスは黙って補正しない: 範囲外の process は何も担当しない
        let p = Partitioner::new(5, 3);
        assert!(scopes(100).iter().all(|s| !p.owns(s)));
    }
}
