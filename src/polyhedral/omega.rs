//! Exact integer linear arithmetic: the Omega test.
//!
//! A [`LinearSystem`] is a conjunction of rows `c + a1*x1 + ... + an*xn >= 0`
//! (inequalities) and `... = 0` (equalities) over integer variables. Rows are
//! stored as `i128` vectors with the constant at index 0 and the coefficient
//! of variable `v` at index `v + 1`.
//!
//! Feasibility is decided exactly:
//! 1. Normalize rows (gcd tightening, duplicate and opposite-pair detection).
//! 2. Eliminate equalities by substitution on a unit coefficient, reducing
//!    coefficients with unimodular column operations when none is unit.
//! 3. Drop variables bounded on one side only.
//! 4. Fourier-Motzkin elimination when it is exact over the integers.
//! 5. Otherwise decide with the real shadow, the dark shadow and splinters.

use log::trace;
use num_integer::Integer;
use std::collections::BTreeMap;

/// A constraint row: `row[0]` is the constant, `row[v + 1]` the coefficient of `v`.
pub type Row = Vec<i128>;

/// A congruence: `row` evaluates to a multiple of `modulus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stride {
    /// Row over the variables of a system, constant first
    pub row: Row,
    /// Positive modulus
    pub modulus: i128,
}

impl Stride {
    /// The congruence `row = 0 (mod |modulus|)`.
    pub fn new(row: Row, modulus: i128) -> Self {
        Self { row, modulus: modulus.abs() }
    }
}

/// Result of minimizing an objective over a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    /// The system has no integer point
    Empty,
    /// The objective is unbounded in the searched direction
    Unbounded,
    /// The attained optimum
    Value(i128),
}

/// Searches for optima stop after this many doublings.
const SEARCH_DOUBLINGS: u32 = 64;

/// How a variable leaves the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Elimination {
    OneSided,
    Exact,
    Inexact,
}

/// A conjunction of integer linear constraints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinearSystem {
    n_var: usize,
    eqs: Vec<Row>,
    ineqs: Vec<Row>,
}

impl LinearSystem {
    /// An unconstrained system over `n_var` variables.
    pub fn new(n_var: usize) -> Self {
        Self {
            n_var,
            eqs: Vec::new(),
            ineqs: Vec::new(),
        }
    }

    /// A system with no integer points.
    pub fn infeasible(n_var: usize) -> Self {
        let mut sys = Self::new(n_var);
        let mut row = sys.zero_row();
        row[0] = -1;
        sys.ineqs.push(row);
        sys
    }

    /// Number of variables.
    pub fn n_var(&self) -> usize {
        self.n_var
    }

    /// A row of zeros sized for this system.
    pub fn zero_row(&self) -> Row {
        vec![0; self.n_var + 1]
    }

    /// Append a fresh unconstrained variable and return its index.
    pub fn add_var(&mut self) -> usize {
        for row in self.eqs.iter_mut().chain(self.ineqs.iter_mut()) {
            row.push(0);
        }
        self.n_var += 1;
        self.n_var - 1
    }

    /// Add `row >= 0`. Short rows are zero-padded.
    pub fn add_ge(&mut self, mut row: Row) {
        row.resize(self.n_var + 1, 0);
        self.ineqs.push(row);
    }

    /// Add `row = 0`. Short rows are zero-padded.
    pub fn add_eq(&mut self, mut row: Row) {
        row.resize(self.n_var + 1, 0);
        self.eqs.push(row);
    }

    /// Equality rows.
    pub fn equalities(&self) -> &[Row] {
        &self.eqs
    }

    /// Inequality rows.
    pub fn inequalities(&self) -> &[Row] {
        &self.ineqs
    }

    /// Conjoin another system over the same variables.
    pub fn intersect(&mut self, other: &LinearSystem) {
        for row in &other.eqs {
            self.add_eq(row.clone());
        }
        for row in &other.ineqs {
            self.add_ge(row.clone());
        }
    }

    /// Check whether an integer point satisfies every row.
    pub fn contains(&self, point: &[i128]) -> bool {
        let eval = |row: &Row| row[0] + row[1..].iter().zip(point).map(|(a, x)| a * x).sum::<i128>();
        self.eqs.iter().all(|r| eval(r) == 0) && self.ineqs.iter().all(|r| eval(r) >= 0)
    }

    /// Exact test for the existence of an integer point.
    pub fn is_feasible(&self) -> bool {
        feasible(self.clone())
    }

    /// Normalized copy of the system, or `None` if normalization proves it empty.
    ///
    /// Normalization keeps the variables and the integer points unchanged.
    pub fn normalized(&self) -> Option<LinearSystem> {
        let mut sys = self.clone();
        if sys.normalize() { Some(sys) } else { None }
    }

    /// Add `stride` through a fresh local `q` with `row - modulus * q = 0`.
    pub fn add_stride(&mut self, stride: Stride) {
        let q = self.add_var();
        let mut row = stride.row;
        row.resize(self.n_var + 1, 0);
        row[q + 1] = -stride.modulus;
        self.eqs.push(row);
    }

    /// Exact integer projection eliminating `vars`.
    ///
    /// `strides` are congruences the input also satisfies. The result is a
    /// union of pieces over the remaining variables, which keep their
    /// relative order, each carrying its own congruences. Where
    /// Fourier-Motzkin is inexact the variable is split into the dark
    /// shadow and the splinters.
    pub fn project_exact(&self, vars: &[usize], strides: &[Stride]) -> Vec<(LinearSystem, Vec<Stride>)> {
        let mut mask = vec![false; self.n_var];
        for &v in vars {
            if let Some(m) = mask.get_mut(v) {
                *m = true;
            }
        }
        let mut work = vec![(self.clone(), strides.to_vec(), mask)];
        let mut pieces = Vec::new();
        'pieces: while let Some((mut sys, mut strides, mut mask)) = work.pop() {
            loop {
                if !sys.normalize() || !reduce_strides(&mut strides) {
                    continue 'pieces;
                }
                // A congruence on an eliminated variable becomes an equality
                // with a fresh eliminated local.
                if let Some(idx) = strides.iter().position(|s| touches(&s.row, &mask)) {
                    let stride = strides.remove(idx);
                    sys.add_stride(stride);
                    mask.push(true);
                    for s in strides.iter_mut() {
                        s.row.push(0);
                    }
                    continue;
                }
                if let Some(idx) = sys.eqs.iter().position(|eq| touches(eq, &mask)) {
                    let eq = sys.eqs.remove(idx);
                    if let Some(stuck) = sys.reduce_equality(eq, Some(&mask)) {
                        strides.extend(sys.divide_out(stuck, &mask));
                    }
                    continue;
                }
                match sys.choose_variable(Some(&mask)) {
                    None => {
                        let kept = strides
                            .iter()
                            .map(|s| Stride::new(keep_columns(&s.row, &mask), s.modulus))
                            .collect();
                        pieces.push((sys.drop_columns(&mask), kept));
                        continue 'pieces;
                    }
                    Some((v, Elimination::OneSided)) => sys.drop_rows_with(v),
                    Some((v, Elimination::Exact)) => sys.fourier_motzkin(v, false),
                    Some((v, Elimination::Inexact)) => {
                        trace!("inexact projection of x{}: dark shadow and splinters", v);
                        for splinter in sys.splinters(v) {
                            work.push((splinter, strides.clone(), mask.clone()));
                        }
                        sys.fourier_motzkin(v, true);
                    }
                }
            }
        }
        pieces
    }

    /// Rational projection eliminating `vars`.
    ///
    /// Every integer point of the system projects into the result, but the
    /// result may contain points with no integer preimage.
    pub fn real_shadow(&self, vars: &[usize]) -> LinearSystem {
        let mut mask = vec![false; self.n_var];
        for &v in vars {
            if let Some(m) = mask.get_mut(v) {
                *m = true;
            }
        }
        let mut sys = self.clone();
        while let Some(idx) = sys.eqs.iter().position(|eq| touches(eq, &mask)) {
            let eq = sys.eqs.remove(idx);
            let Some(k) = (0..sys.n_var).find(|&v| mask[v] && eq[v + 1] != 0) else { continue };
            let a = eq[k + 1];
            for row in sys.eqs.iter_mut().chain(sys.ineqs.iter_mut()) {
                let r = row[k + 1];
                if r != 0 {
                    for (x, e) in row.iter_mut().zip(&eq) {
                        *x = *x * a.abs() - r * a.signum() * e;
                    }
                }
            }
        }
        for v in 0..sys.n_var {
            if mask[v] {
                sys.fourier_motzkin(v, false);
            }
        }
        sys.drop_columns(&mask)
    }

    /// Minimum of the affine objective `row` over the integer points.
    pub fn minimum(&self, objective: &Row) -> Extremum {
        let mut sys = self.clone();
        let z = sys.add_var();
        let mut link: Row = objective.iter().map(|c| -c).collect();
        link.resize(sys.n_var + 1, 0);
        link[z + 1] = 1;
        sys.eqs.push(link);
        if !sys.is_feasible() {
            return Extremum::Empty;
        }

        // Whether some point has z <= v.
        let attains = |v: i128| {
            let mut s = sys.clone();
            let mut row = s.zero_row();
            row[0] = v;
            row[z + 1] = -1;
            s.ineqs.push(row);
            s.is_feasible()
        };

        let (mut lo, mut hi);
        if attains(0) {
            hi = 0;
            let mut step: i128 = 1;
            let mut doublings = 0;
            loop {
                let next = hi - step;
                if !attains(next) {
                    lo = next;
                    break;
                }
                hi = next;
                step *= 2;
                doublings += 1;
                if doublings > SEARCH_DOUBLINGS {
                    return Extremum::Unbounded;
                }
            }
        } else {
            lo = 0;
            let mut step: i128 = 1;
            loop {
                let next = lo + step;
                if attains(next) {
                    hi = next;
                    break;
                }
                lo = next;
                step *= 2;
            }
        }
        // attains(lo) is false, attains(hi) is true
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if attains(mid) { hi = mid } else { lo = mid }
        }
        Extremum::Value(hi)
    }

    /// Maximum of the affine objective `row` over the integer points.
    pub fn maximum(&self, objective: &Row) -> Extremum {
        let negated: Row = objective.iter().map(|c| -c).collect();
        match self.minimum(&negated) {
            Extremum::Value(v) => Extremum::Value(-v),
            other => other,
        }
    }

    /// Lexicographically smallest integer point, if one exists and every
    /// coordinate is bounded below along the way.
    pub fn lexmin(&self) -> Option<Vec<i128>> {
        let mut sys = self.clone();
        let mut point = Vec::with_capacity(self.n_var);
        for v in 0..self.n_var {
            let mut objective = sys.zero_row();
            objective[v + 1] = 1;
            let Extremum::Value(x) = sys.minimum(&objective) else { return None };
            let mut fix = sys.zero_row();
            fix[0] = -x;
            fix[v + 1] = 1;
            sys.eqs.push(fix);
            point.push(x);
        }
        Some(point)
    }

    /// Whether variable `v` has both a lower and an upper bound in terms of
    /// the variables outside `others`, after rationally eliminating `others`.
    pub fn is_bounded(&self, v: usize, others: &[usize]) -> bool {
        let shadow = self.real_shadow(others);
        let col = v + 1 - others.iter().filter(|&&o| o < v).count();
        let has_eq = shadow.eqs.iter().any(|r| r[col] != 0);
        let has_lower = shadow.ineqs.iter().any(|r| r[col] > 0);
        let has_upper = shadow.ineqs.iter().any(|r| r[col] < 0);
        has_eq || (has_lower && has_upper)
    }

    /// Tighten and deduplicate rows. Returns `false` if the system is
    /// proved empty.
    fn normalize(&mut self) -> bool {
        let mut bounds: BTreeMap<Vec<i128>, i128> = BTreeMap::new();
        for row in std::mem::take(&mut self.ineqs) {
            let g = coeff_gcd(&row);
            if g == 0 {
                if row[0] < 0 {
                    return false;
                }
                continue;
            }
            let constant = row[0].div_floor(&g);
            let coeffs: Vec<i128> = row[1..].iter().map(|c| c / g).collect();
            bounds
                .entry(coeffs)
                .and_modify(|c| *c = (*c).min(constant))
                .or_insert(constant);
        }

        for (coeffs, &c) in &bounds {
            let opposite: Vec<i128> = coeffs.iter().map(|x| -x).collect();
            if let Some(&d) = bounds.get(&opposite) {
                if c + d < 0 {
                    return false;
                }
                if c + d == 0 && coeffs > &opposite {
                    let mut eq = vec![c];
                    eq.extend_from_slice(coeffs);
                    self.eqs.push(eq);
                }
            }
        }
        for (coeffs, c) in bounds {
            let mut row = vec![c];
            row.extend(coeffs);
            self.ineqs.push(row);
        }

        let mut eqs: Vec<Row> = Vec::with_capacity(self.eqs.len());
        for mut row in std::mem::take(&mut self.eqs) {
            let g = coeff_gcd(&row);
            if g == 0 {
                if row[0] != 0 {
                    return false;
                }
                continue;
            }
            if row[0] % g != 0 {
                return false;
            }
            for x in row.iter_mut() {
                *x /= g;
            }
            if row[1..].iter().find(|&&c| c != 0).is_some_and(|&c| c < 0) {
                for x in row.iter_mut() {
                    *x = -*x;
                }
            }
            if let Some(other) = eqs.iter().find(|e| e[1..] == row[1..]) {
                if other[0] != row[0] {
                    return false;
                }
                continue;
            }
            eqs.push(row);
        }
        self.eqs = eqs;
        true
    }

    /// Remove a normalized equality by substitution.
    ///
    /// With a mask, only masked variables may be substituted or renamed.
    /// Returns the reduced equality when its only masked variable has a
    /// non-unit coefficient.
    fn reduce_equality(&mut self, mut eq: Row, mask: Option<&[bool]>) -> Option<Row> {
        let allowed = |v: usize| mask.map_or(true, |m| m[v]);
        loop {
            let candidates: Vec<usize> = (0..self.n_var).filter(|&v| allowed(v) && eq[v + 1] != 0).collect();
            if let Some(&k) = candidates.iter().find(|&&v| eq[v + 1].abs() == 1) {
                self.substitute(&eq, k);
                return None;
            }
            if candidates.len() <= 1 {
                return Some(eq);
            }
            let Some(&j) = candidates.iter().min_by_key(|&&v| (eq[v + 1].abs(), v)) else {
                return Some(eq);
            };
            let aj = eq[j + 1];
            for &c in &candidates {
                if c == j {
                    continue;
                }
                let q = eq[c + 1].div_euclid(aj);
                if q == 0 {
                    continue;
                }
                // x_j := x_j' - q * x_c keeps the lattice
                for row in self.eqs.iter_mut().chain(self.ineqs.iter_mut()).chain(std::iter::once(&mut eq)) {
                    row[c + 1] -= q * row[j + 1];
                }
            }
        }
    }

    /// Cancel the only masked variable `v` of `eq = a*v + rest` from every
    /// row by scaling with `|a|`. An integer `v` exists exactly when
    /// `rest = 0 (mod |a|)`, which is returned.
    fn divide_out(&mut self, eq: Row, mask: &[bool]) -> Option<Stride> {
        let Some(v) = (0..self.n_var).find(|&v| mask[v] && eq[v + 1] != 0) else {
            self.eqs.push(eq);
            return None;
        };
        let a = eq[v + 1];
        for row in self.eqs.iter_mut().chain(self.ineqs.iter_mut()) {
            let r = row[v + 1];
            if r != 0 {
                for (x, e) in row.iter_mut().zip(&eq) {
                    *x = *x * a.abs() - r * a.signum() * e;
                }
            }
        }
        let mut rest = eq;
        rest[v + 1] = 0;
        Some(Stride::new(rest, a))
    }

    fn substitute(&mut self, eq: &Row, k: usize) {
        let a = eq[k + 1];
        for row in self.eqs.iter_mut().chain(self.ineqs.iter_mut()) {
            let r = row[k + 1];
            if r != 0 {
                let f = r * a;
                for (x, e) in row.iter_mut().zip(eq) {
                    *x -= f * e;
                }
            }
        }
    }

    fn choose_variable(&self, mask: Option<&[bool]>) -> Option<(usize, Elimination)> {
        let mut best: Option<(Elimination, usize, usize)> = None;
        for v in 0..self.n_var {
            if mask.is_some_and(|m| !m[v]) {
                continue;
            }
            let lowers: Vec<i128> = self.ineqs.iter().map(|r| r[v + 1]).filter(|&c| c > 0).collect();
            let uppers: Vec<i128> = self.ineqs.iter().map(|r| -r[v + 1]).filter(|&c| c > 0).collect();
            if lowers.is_empty() && uppers.is_empty() {
                continue;
            }
            if lowers.is_empty() || uppers.is_empty() {
                return Some((v, Elimination::OneSided));
            }
            let exact = lowers.iter().all(|&a| a == 1) || uppers.iter().all(|&b| b == 1);
            let kind = if exact { Elimination::Exact } else { Elimination::Inexact };
            let cost = lowers.len() * uppers.len();
            if best.map_or(true, |(k, c, _)| (kind, cost) < (k, c)) {
                best = Some((kind, cost, v));
            }
        }
        best.map(|(kind, _, v)| (v, kind))
    }

    fn drop_rows_with(&mut self, v: usize) {
        self.ineqs.retain(|r| r[v + 1] == 0);
    }

    fn fourier_motzkin(&mut self, v: usize, dark: bool) {
        let (lowers, uppers, mut rest) = self.partition(v);
        for l in &lowers {
            for u in &uppers {
                rest.push(combine(l, u, v, dark));
            }
        }
        self.ineqs = rest;
    }

    fn partition(&self, v: usize) -> (Vec<Row>, Vec<Row>, Vec<Row>) {
        let mut lowers = Vec::new();
        let mut uppers = Vec::new();
        let mut rest = Vec::new();
        for row in &self.ineqs {
            match row[v + 1].signum() {
                1 => lowers.push(row.clone()),
                -1 => uppers.push(row.clone()),
                _ => rest.push(row.clone()),
            }
        }
        (lowers, uppers, rest)
    }

    /// Copies of the system for an inexact elimination of `v`: one per
    /// lower bound `a*v + L >= 0` and offset `i`, with `a*v + L = i`.
    fn splinters(&self, v: usize) -> Vec<LinearSystem> {
        let (lowers, uppers, _) = self.partition(v);
        let m = uppers.iter().map(|u| -u[v + 1]).max().unwrap_or(1);
        let mut pieces = Vec::new();
        for lower in &lowers {
            let a = lower[v + 1];
            let limit = (m * a - a - m).div_floor(&m);
            trace!("omega splinters on x{}: coefficient {}, {} cases", v, a, limit + 1);
            for i in 0..=limit {
                let mut piece = self.clone();
                let mut eq = lower.clone();
                eq[0] -= i;
                piece.eqs.push(eq);
                pieces.push(piece);
            }
        }
        pieces
    }

    fn drop_columns(&self, mask: &[bool]) -> LinearSystem {
        LinearSystem {
            n_var: mask.iter().filter(|&&m| !m).count(),
            eqs: self.eqs.iter().map(|r| keep_columns(r, mask)).collect(),
            ineqs: self.ineqs.iter().map(|r| keep_columns(r, mask)).collect(),
        }
    }
}

fn keep_columns(row: &Row, mask: &[bool]) -> Row {
    let mut out = vec![row[0]];
    out.extend(mask.iter().enumerate().filter(|(_, &m)| !m).map(|(v, _)| row[v + 1]));
    out
}

/// Reduce congruences modulo their moduli and drop the trivial ones.
/// Returns `false` if one has no solution.
fn reduce_strides(strides: &mut Vec<Stride>) -> bool {
    let mut satisfiable = true;
    strides.retain_mut(|s| {
        for x in s.row.iter_mut() {
            *x = x.mod_floor(&s.modulus);
        }
        if s.row[1..].iter().all(|&c| c == 0) {
            satisfiable &= s.row[0] == 0;
            false
        } else {
            true
        }
    });
    satisfiable
}

fn coeff_gcd(row: &Row) -> i128 {
    row[1..].iter().fold(0i128, |g, c| g.gcd(c))
}

fn touches(row: &Row, mask: &[bool]) -> bool {
    mask.iter().enumerate().any(|(v, &m)| m && row[v + 1] != 0)
}

/// Combine a lower bound `a*z + L >= 0` and an upper bound `-b*z + U >= 0`.
fn combine(lower: &Row, upper: &Row, v: usize, dark: bool) -> Row {
    let a = lower[v + 1];
    let b = -upper[v + 1];
    let mut row: Row = lower.iter().zip(upper).map(|(l, u)| b * l + a * u).collect();
    if dark {
        row[0] -= (a - 1) * (b - 1);
    }
    row
}

fn feasible(mut sys: LinearSystem) -> bool {
    loop {
        if !sys.normalize() {
            return false;
        }
        if let Some(eq) = sys.eqs.pop() {
            // normalized, so some coefficient is reduced to a unit
            let _ = sys.reduce_equality(eq, None);
            continue;
        }
        match sys.choose_variable(None) {
            None => return true,
            Some((v, Elimination::OneSided)) => sys.drop_rows_with(v),
            Some((v, Elimination::Exact)) => sys.fourier_motzkin(v, false),
            Some((v, Elimination::Inexact)) => return omega_split(sys, v),
        }
    }
}

fn omega_split(sys: LinearSystem, v: usize) -> bool {
    let mut real = sys.clone();
    real.fourier_motzkin(v, false);
    if !feasible(real) {
        return false;
    }
    let mut dark = sys.clone();
    dark.fourier_motzkin(v, true);
    if feasible(dark) {
        return true;
    }

    sys.splinters(v).into_iter().any(feasible)
}
